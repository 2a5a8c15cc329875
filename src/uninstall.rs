//! Carries out a deletion approved by the guard.

use crate::brew::PackageManagerClient;
use crate::ecosystem::{is_strictly_inside, EcosystemLayout};
use crate::guard::{self, Rejection};
use crate::models::{InstalledVersion, Provenance};
use crate::process::OutputSink;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Remove `candidate` through the backend that owns it.
///
/// The active and system checks run again here so a stale decision made
/// before an inventory change cannot delete anything.
pub async fn execute(
    layout: &EcosystemLayout,
    client: &PackageManagerClient,
    candidate: &InstalledVersion,
    active: Option<&InstalledVersion>,
    sink: &OutputSink,
) -> bool {
    if active.is_some_and(|a| a.is_same_installation(candidate)) {
        return reject(candidate, Rejection::Active, sink);
    }

    match candidate.provenance {
        Provenance::System => reject(candidate, Rejection::SystemOwned, sink),
        Provenance::PackageManager => {
            let Some(identifier) = package_identifier(layout, &candidate.install_root) else {
                sink.line(format!(
                    "Cannot determine the package for {}",
                    candidate.install_root.display()
                ));
                return false;
            };
            sink.line(format!("Uninstalling {} ({})", identifier, candidate.version));
            client.uninstall(&identifier, sink).await
        }
        Provenance::VersionManager(_) => {
            if let Some(rejection) = guard::check(layout, candidate, active) {
                return reject(candidate, rejection, sink);
            }
            let Some(target) = version_directory(layout, candidate) else {
                sink.line(format!(
                    "Unsupported layout for {}",
                    candidate.install_root.display()
                ));
                return false;
            };
            remove_directory(&target, sink).await
        }
    }
}

fn reject(candidate: &InstalledVersion, rejection: Rejection, sink: &OutputSink) -> bool {
    warn!(
        "Refusing to remove {} {}: {:?}",
        candidate.ecosystem, candidate.version, rejection
    );
    sink.line(format!(
        "Cannot uninstall {} {}: {}",
        candidate.ecosystem.display_name(),
        candidate.version,
        rejection.message()
    ));
    false
}

async fn remove_directory(target: &Path, sink: &OutputSink) -> bool {
    sink.line(format!("Removing {}", target.display()));
    match tokio::fs::remove_dir_all(target).await {
        Ok(()) => {
            info!("Removed {}", target.display());
            sink.line(format!("Removed {}", target.display()));
            true
        }
        Err(e) => {
            sink.line(format!("Failed to remove {}: {}", target.display(), e));
            false
        }
    }
}

/// Formula name owning a cellar path: the segment right after the cellar root
pub fn package_identifier(layout: &EcosystemLayout, install_root: &Path) -> Option<String> {
    let segment = match layout.owning_cellar(install_root) {
        Some(cellar) => install_root
            .strip_prefix(cellar)
            .ok()?
            .components()
            .next()
            .map(Component::as_os_str),
        None => {
            let mut components = install_root.components().map(Component::as_os_str);
            components.find(|c| *c == OsStr::new("Cellar"))?;
            components.next()
        }
    }?;

    segment
        .to_str()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The per-version directory holding `candidate`, one level below the
/// manager root.
///
/// Flat layouts give the install root itself. Nested layouts (fnm
/// `<v>/installation`, user JVM `<x>.jdk/Contents/Home`) give `<v>`, which
/// is removed whole so no empty version directory is left for the manager
/// to list.
pub fn version_directory(
    layout: &EcosystemLayout,
    candidate: &InstalledVersion,
) -> Option<PathBuf> {
    let Provenance::VersionManager(slot) = candidate.provenance else {
        return None;
    };
    let vm = layout.version_manager(slot)?;
    let first = candidate
        .install_root
        .strip_prefix(&vm.root)
        .ok()?
        .components()
        .next()?;

    let target = vm.root.join(first.as_os_str());
    is_strictly_inside(&target, &vm.root).then_some(target)
}
