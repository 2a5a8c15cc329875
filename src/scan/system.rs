use crate::ecosystem::{EcosystemLayout, VersionStyle};
use crate::models::InstalledVersion;
use crate::probe::FsProbe;
use crate::process::CommandRunner;
use std::path::PathBuf;
use tracing::debug;

/// The installation reachable through the inherited `PATH`.
///
/// Launch failures and unexpected output are skipped silently.
pub async fn scan(
    layout: &EcosystemLayout,
    probe: &dyn FsProbe,
    runner: &dyn CommandRunner,
) -> Vec<InstalledVersion> {
    let descriptor = layout.descriptor;
    let query = &descriptor.system;

    let output = match runner.output(query.program, query.version_args).await {
        Ok(output) => output,
        Err(e) => {
            debug!("{} not runnable: {}", query.program, e);
            return Vec::new();
        }
    };

    let Some(version) = parse_version_output(query.style, &output.combined()) else {
        debug!("Unrecognised {} version output", query.program);
        return Vec::new();
    };

    let root = match query.root_args {
        Some(args) => match runner.output(query.program, args).await {
            Ok(out) if out.success => {
                let reported = out.stdout.trim();
                (!reported.is_empty()).then(|| PathBuf::from(reported))
            }
            _ => None,
        },
        None => runner.locate(query.program).and_then(|binary| {
            let binary = probe.canonicalize(&binary).unwrap_or(binary);
            // <root>/bin/<program>
            binary.parent()?.parent().map(|p| p.to_path_buf())
        }),
    };

    let Some(root) = root else {
        debug!("Could not determine {} installation root", query.program);
        return Vec::new();
    };
    let root = probe.canonicalize(&root).unwrap_or(root);

    if !probe.exists(&root, descriptor.binary) {
        debug!("{} has no {}", root.display(), descriptor.binary);
        return Vec::new();
    }

    let (provenance, source) = layout.classify(&root);
    vec![InstalledVersion::new(
        descriptor.ecosystem,
        root,
        version,
        provenance,
        source,
    )]
}

/// Extract the self-reported version from a version query
pub fn parse_version_output(style: VersionStyle, output: &str) -> Option<String> {
    match style {
        VersionStyle::Prefixed(prefix) => output.lines().find_map(|line| {
            let rest = line.trim().strip_prefix(prefix)?;
            let version = rest.split_whitespace().next()?;
            version
                .starts_with(|c: char| c.is_ascii_digit())
                .then(|| version.to_string())
        }),
        VersionStyle::Quoted => output.lines().find_map(|line| {
            let start = line.find("version \"")? + "version \"".len();
            let end = line[start..].find('"')?;
            let version = &line[start..start + end];
            (!version.is_empty()).then(|| version.to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystem::descriptor;
    use crate::models::{Ecosystem, Provenance};
    use crate::probe::DiskProbe;
    use crate::process::testing::ScriptedRunner;
    use std::path::Path;
    use tempfile::TempDir;

    fn layout(ecosystem: Ecosystem, cellar: PathBuf) -> EcosystemLayout {
        EcosystemLayout {
            descriptor: descriptor(ecosystem),
            cellar_roots: vec![cellar],
            version_managers: Vec::new(),
            reserved_paths: Vec::new(),
            fragment_path: PathBuf::from("/dev/null"),
            registry_helper: None,
            scan_system: true,
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_parse_prefixed_versions() {
        assert_eq!(
            parse_version_output(VersionStyle::Prefixed("v"), "v20.10.0\n"),
            Some("20.10.0".to_string())
        );
        assert_eq!(
            parse_version_output(VersionStyle::Prefixed("Python "), "Python 3.12.1"),
            Some("3.12.1".to_string())
        );
        assert_eq!(
            parse_version_output(
                VersionStyle::Prefixed("go version go"),
                "go version go1.22.0 darwin/arm64"
            ),
            Some("1.22.0".to_string())
        );
        assert_eq!(
            parse_version_output(VersionStyle::Prefixed("v"), "command not found"),
            None
        );
    }

    #[test]
    fn test_parse_quoted_java_version() {
        let output = "openjdk version \"21.0.1\" 2023-10-17\nOpenJDK Runtime Environment";
        assert_eq!(
            parse_version_output(VersionStyle::Quoted, output),
            Some("21.0.1".to_string())
        );
        assert_eq!(
            parse_version_output(
                VersionStyle::Quoted,
                "The operation couldn't be completed. Unable to locate a Java Runtime."
            ),
            None
        );
    }

    #[tokio::test]
    async fn test_go_root_from_env_query() {
        let temp = TempDir::new().unwrap();
        let goroot = temp.path().join("go");
        touch(&goroot.join("bin/go"));

        let runner = ScriptedRunner::new();
        runner.on_output("go version", "go version go1.22.0 linux/amd64\n", "", true);
        runner.on_output("go env GOROOT", &format!("{}\n", goroot.display()), "", true);

        let found = scan(
            &layout(Ecosystem::Go, temp.path().join("Cellar")),
            &DiskProbe,
            &runner,
        )
        .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "1.22.0");
        assert_eq!(found[0].provenance, Provenance::System);
        assert_eq!(
            found[0].install_root,
            std::fs::canonicalize(&goroot).unwrap()
        );
    }

    #[tokio::test]
    async fn test_node_resolved_into_cellar_is_package_managed() {
        let temp = TempDir::new().unwrap();
        let cellar = std::fs::canonicalize(temp.path()).unwrap().join("Cellar");
        let binary = cellar.join("node/24.9.0/bin/node");
        touch(&binary);

        let runner = ScriptedRunner::new();
        runner.on_output("node --version", "v24.9.0\n", "", true);
        runner.on_locate("node", binary);

        let found = scan(&layout(Ecosystem::Node, cellar.clone()), &DiskProbe, &runner).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].install_root, cellar.join("node/24.9.0"));
        assert_eq!(found[0].provenance, Provenance::PackageManager);
    }

    #[tokio::test]
    async fn test_missing_binary_is_skipped() {
        let runner = ScriptedRunner::new();
        let found = scan(
            &layout(Ecosystem::Python, PathBuf::from("/nonexistent")),
            &DiskProbe,
            &runner,
        )
        .await;
        assert!(found.is_empty());
    }
}
