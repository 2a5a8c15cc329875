use crate::ecosystem::{join_relative, EcosystemDescriptor, EcosystemLayout};
use crate::models::{InstalledVersion, Provenance};
use crate::probe::{is_hidden, FsProbe};
use std::path::Path;
use tracing::debug;

/// Installations inside the package manager's cellar roots
pub fn scan(layout: &EcosystemLayout, probe: &dyn FsProbe) -> Vec<InstalledVersion> {
    let descriptor = layout.descriptor;
    let mut found = Vec::new();

    for cellar in &layout.cellar_roots {
        for package in probe.list_child_directories(cellar) {
            if !descriptor.matches_package(&package) {
                continue;
            }

            let package_dir = cellar.join(&package);
            for label in probe.list_child_directories(&package_dir) {
                if is_hidden(&label) {
                    continue;
                }

                let root = join_relative(&package_dir.join(&label), descriptor.cellar_home);
                if !probe.exists(&root, descriptor.binary) {
                    debug!("No {} under {}", descriptor.binary, root.display());
                    continue;
                }

                let version = release_version(descriptor, probe, &root)
                    .unwrap_or_else(|| strip_revision(&label).to_string());

                found.push(InstalledVersion::new(
                    descriptor.ecosystem,
                    root,
                    version,
                    Provenance::PackageManager,
                    "homebrew",
                ));
            }
        }
    }

    found
}

/// Drop a trailing `_<n>` bottle revision
pub fn strip_revision(label: &str) -> &str {
    match label.rsplit_once('_') {
        Some((version, revision))
            if !version.is_empty()
                && !revision.is_empty()
                && revision.chars().all(|c| c.is_ascii_digit()) =>
        {
            version
        }
        _ => label,
    }
}

/// Version recorded in the installation's release metadata
fn release_version(
    descriptor: &EcosystemDescriptor,
    probe: &dyn FsProbe,
    root: &Path,
) -> Option<String> {
    let (file, key) = descriptor.release_metadata?;
    let contents = probe.read_text(&root.join(file))?;
    parse_release_value(&contents, key)
}

/// Value of `KEY="value"` in a release file
pub fn parse_release_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix(key)?.trim_start().strip_prefix('=')?;
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
