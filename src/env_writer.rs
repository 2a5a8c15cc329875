//! Persists the environment fragment that makes one installation active.

use crate::ecosystem::EcosystemDescriptor;
use crate::error::{DevswitchError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Shell export text selecting `install_root`
pub fn render_fragment(descriptor: &EcosystemDescriptor, install_root: &Path) -> String {
    let root = install_root.display();
    match descriptor.home_var {
        Some(var) => format!(
            "# {} selected by devswitch\nexport {}=\"{}\"\nexport PATH=\"${}/bin:$PATH\"\n",
            descriptor.ecosystem.display_name(),
            var,
            root,
            var
        ),
        None => format!(
            "# {} selected by devswitch\nexport PATH=\"{}/bin:$PATH\"\n",
            descriptor.ecosystem.display_name(),
            root
        ),
    }
}

/// Replace the fragment at `fragment_path` in one step.
///
/// The text goes to a temporary file in the same directory which is then
/// renamed over the old fragment, so readers see either the old or the new
/// content in full.
pub fn write(
    descriptor: &EcosystemDescriptor,
    fragment_path: &Path,
    install_root: &Path,
) -> Result<()> {
    let wrap = |source: std::io::Error| DevswitchError::EnvironmentWrite {
        path: fragment_path.to_path_buf(),
        source,
    };

    let dir = fragment_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(wrap)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(wrap)?;
    temp.write_all(render_fragment(descriptor, install_root).as_bytes())
        .map_err(wrap)?;
    temp.as_file().sync_all().map_err(wrap)?;
    temp.persist(fragment_path).map_err(|e| wrap(e.error))?;

    info!(
        "Wrote {} selecting {}",
        fragment_path.display(),
        install_root.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::resolve_active;
    use crate::ecosystem::descriptor;
    use crate::models::{Ecosystem, InstalledVersion, Provenance};
    use crate::probe::DiskProbe;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_render_per_ecosystem() {
        let jdk = render_fragment(descriptor(Ecosystem::Jdk), Path::new("/jdk/Home"));
        assert!(jdk.contains("export JAVA_HOME=\"/jdk/Home\"\n"));
        assert!(jdk.contains("export PATH=\"$JAVA_HOME/bin:$PATH\"\n"));

        let node = render_fragment(descriptor(Ecosystem::Node), Path::new("/n/24.9.0"));
        assert!(node.contains("export PATH=\"/n/24.9.0/bin:$PATH\"\n"));
        assert!(!node.contains("HOME"));

        let go = render_fragment(descriptor(Ecosystem::Go), Path::new("/go/libexec"));
        assert!(go.contains("export GOROOT=\"/go/libexec\"\n"));
        assert!(go.contains("export PATH=\"$GOROOT/bin:$PATH\"\n"));
    }

    #[test]
    fn test_write_creates_directory_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let fragment = temp.path().join("nested/config/python_env.sh");
        let python = descriptor(Ecosystem::Python);

        write(python, &fragment, Path::new("/py/3.11.4")).unwrap();
        write(python, &fragment, Path::new("/py/3.12.1")).unwrap();

        let content = std::fs::read_to_string(&fragment).unwrap();
        assert!(content.contains("/py/3.12.1/bin"));
        assert!(!content.contains("3.11.4"));

        let leftovers = std::fs::read_dir(fragment.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_written_fragment_resolves_back() {
        let temp = TempDir::new().unwrap();
        let fragment = temp.path().join("jdk_env.sh");
        let versions: Vec<InstalledVersion> = ["17.0.9", "21.0.2"]
            .iter()
            .map(|v| {
                InstalledVersion::new(
                    Ecosystem::Jdk,
                    PathBuf::from(format!(
                        "/opt/homebrew/Cellar/openjdk/{}/libexec/openjdk.jdk/Contents/Home",
                        v
                    )),
                    *v,
                    Provenance::PackageManager,
                    "homebrew",
                )
            })
            .collect();

        write(descriptor(Ecosystem::Jdk), &fragment, &versions[1].install_root).unwrap();
        assert_eq!(
            resolve_active(&DiskProbe, &fragment, &versions),
            Some(&versions[1])
        );
    }

    #[test]
    fn test_write_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // parent is a regular file, so the directory cannot be created
        let result = write(
            descriptor(Ecosystem::Node),
            &blocker.join("node_env.sh"),
            Path::new("/n"),
        );
        assert!(matches!(result, Err(DevswitchError::EnvironmentWrite { .. })));
    }
}
