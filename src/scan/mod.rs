//! Discovery of installations from every source an ecosystem supports.

pub mod cellar;
pub mod jdk_registry;
pub mod system;
pub mod version_manager;

use crate::ecosystem::EcosystemLayout;
use crate::models::{InstalledVersion, Provenance};
use crate::probe::FsProbe;
use crate::process::CommandRunner;
use std::collections::HashMap;
use tracing::debug;

/// Run every scanner for the layout's ecosystem and merge the results.
///
/// Scanner priority is package manager, version managers, JDK registry,
/// then `PATH`.
pub async fn scan_all(
    layout: &EcosystemLayout,
    probe: &dyn FsProbe,
    runner: &dyn CommandRunner,
) -> Vec<InstalledVersion> {
    let mut found = cellar::scan(layout, probe);
    found.extend(version_manager::scan(layout, probe));

    if let Some(helper) = &layout.registry_helper {
        found.extend(jdk_registry::scan(layout, probe, runner, helper).await);
    }

    if layout.scan_system {
        found.extend(system::scan(layout, probe, runner).await);
    }

    merge(found)
}

/// Deduplicate by install root, keeping the first occurrence.
///
/// When a later duplicate comes from the package manager it replaces the
/// earlier entry in place. Entries that resolve inside a package-manager
/// install root are folded into it.
pub fn merge(found: Vec<InstalledVersion>) -> Vec<InstalledVersion> {
    let mut merged: Vec<InstalledVersion> = Vec::with_capacity(found.len());
    let mut by_root: HashMap<std::path::PathBuf, usize> = HashMap::new();

    for candidate in found {
        if let Some(&index) = by_root.get(&candidate.install_root) {
            let existing = &mut merged[index];
            if candidate.provenance == Provenance::PackageManager
                && existing.provenance != Provenance::PackageManager
            {
                debug!(
                    "Preferring package manager entry for {}",
                    candidate.install_root.display()
                );
                *existing = candidate;
            }
            continue;
        }

        let inside_package = merged.iter().any(|kept| {
            kept.provenance == Provenance::PackageManager
                && candidate.install_root.starts_with(&kept.install_root)
        });
        if inside_package {
            debug!(
                "Folding {} into its package manager installation",
                candidate.install_root.display()
            );
            continue;
        }

        by_root.insert(candidate.install_root.clone(), merged.len());
        merged.push(candidate);
    }

    merged
}
