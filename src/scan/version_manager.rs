use crate::ecosystem::{join_relative, EcosystemLayout};
use crate::models::{InstalledVersion, Provenance};
use crate::probe::{is_hidden, FsProbe};
use tracing::debug;

/// Installations under the per-user version managers.
///
/// The directory name is the version label, verbatim. Symlinked entries
/// (SDKMAN `current`, pyenv aliases) point at a version listed on its own
/// and are skipped.
pub fn scan(layout: &EcosystemLayout, probe: &dyn FsProbe) -> Vec<InstalledVersion> {
    let descriptor = layout.descriptor;
    let mut found = Vec::new();

    for manager in &layout.version_managers {
        for label in probe.list_child_directories(&manager.root) {
            if is_hidden(&label) {
                continue;
            }
            if probe.is_symlink(&manager.root.join(&label)) {
                debug!("{}: skipping alias {}", manager.name, label);
                continue;
            }

            let root = join_relative(&manager.root.join(&label), manager.nested.unwrap_or(""));
            if !probe.exists(&root, descriptor.binary) {
                debug!(
                    "{}: no {} under {}",
                    manager.name,
                    descriptor.binary,
                    root.display()
                );
                continue;
            }

            found.push(InstalledVersion::new(
                descriptor.ecosystem,
                root,
                label,
                Provenance::VersionManager(manager.slot),
                manager.name,
            ));
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystem::{descriptor, VersionManagerRoot};
    use crate::models::{Ecosystem, ManagerSlot};
    use crate::probe::DiskProbe;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_nested_and_flat_managers() {
        let temp = TempDir::new().unwrap();
        let nvm = temp.path().join("nvm/versions/node");
        let fnm = temp.path().join("fnm/node-versions");
        touch(&nvm.join("v20.10.0/bin/node"));
        touch(&fnm.join("v22.1.0/installation/bin/node"));
        touch(&fnm.join("v21.0.0/bin/node"));

        let layout = EcosystemLayout {
            descriptor: descriptor(Ecosystem::Node),
            cellar_roots: Vec::new(),
            version_managers: vec![
                VersionManagerRoot {
                    slot: ManagerSlot::Primary,
                    name: "nvm",
                    root: nvm.clone(),
                    nested: None,
                },
                VersionManagerRoot {
                    slot: ManagerSlot::Secondary,
                    name: "fnm",
                    root: fnm.clone(),
                    nested: Some("installation"),
                },
            ],
            reserved_paths: Vec::new(),
            fragment_path: PathBuf::from("/dev/null"),
            registry_helper: None,
            scan_system: false,
        };

        let found = scan(&layout, &DiskProbe);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].version, "v20.10.0");
        assert_eq!(found[0].install_root, nvm.join("v20.10.0"));
        assert_eq!(
            found[0].provenance,
            Provenance::VersionManager(ManagerSlot::Primary)
        );
        assert_eq!(found[1].install_root, fnm.join("v22.1.0/installation"));
        assert_eq!(found[1].source, "fnm");
    }

    #[cfg(unix)]
    #[test]
    fn test_alias_links_are_not_listed_twice() {
        let temp = TempDir::new().unwrap();
        let sdkman = temp.path().join(".sdkman/candidates/java");
        touch(&sdkman.join("21.0.2-tem/bin/java"));
        std::os::unix::fs::symlink("21.0.2-tem", sdkman.join("current")).unwrap();

        let layout = EcosystemLayout {
            descriptor: descriptor(Ecosystem::Jdk),
            cellar_roots: Vec::new(),
            version_managers: vec![VersionManagerRoot {
                slot: ManagerSlot::Primary,
                name: "sdkman",
                root: sdkman.clone(),
                nested: None,
            }],
            reserved_paths: Vec::new(),
            fragment_path: PathBuf::from("/dev/null"),
            registry_helper: None,
            scan_system: false,
        };

        let found = scan(&layout, &DiskProbe);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "21.0.2-tem");
        assert_eq!(found[0].install_root, sdkman.join("21.0.2-tem"));
    }

    #[test]
    fn test_missing_manager_root_is_empty() {
        let layout = EcosystemLayout {
            descriptor: descriptor(Ecosystem::Python),
            cellar_roots: Vec::new(),
            version_managers: vec![VersionManagerRoot {
                slot: ManagerSlot::Primary,
                name: "pyenv",
                root: PathBuf::from("/nonexistent/pyenv/versions"),
                nested: None,
            }],
            reserved_paths: Vec::new(),
            fragment_path: PathBuf::from("/dev/null"),
            registry_helper: None,
            scan_system: false,
        };
        assert!(scan(&layout, &DiskProbe).is_empty());
    }
}
