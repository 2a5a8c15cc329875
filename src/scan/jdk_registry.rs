use crate::ecosystem::EcosystemLayout;
use crate::models::{InstalledVersion, Provenance};
use crate::probe::FsProbe;
use crate::process::CommandRunner;
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;

/// One JVM reported by the platform registry helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub home_path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
}

/// JDKs registered with `java_home -X`
pub async fn scan(
    layout: &EcosystemLayout,
    probe: &dyn FsProbe,
    runner: &dyn CommandRunner,
    helper: &str,
) -> Vec<InstalledVersion> {
    let output = match runner.output(helper, &["-X"]).await {
        Ok(output) if output.success => output,
        Ok(_) => {
            debug!("{} reported no JVMs", helper);
            return Vec::new();
        }
        Err(e) => {
            debug!("{} not runnable: {}", helper, e);
            return Vec::new();
        }
    };

    let descriptor = layout.descriptor;
    parse_registry_plist(&output.stdout)
        .into_iter()
        .filter_map(|entry| {
            let home = probe
                .canonicalize(&entry.home_path)
                .unwrap_or(entry.home_path);
            if !probe.exists(&home, descriptor.binary) {
                debug!("Registered JVM {} has no java binary", home.display());
                return None;
            }

            let (provenance, source) = match layout.classify(&home) {
                (Provenance::System, _) => (Provenance::System, "java_home"),
                other => other,
            };
            let version = entry
                .version
                .or(entry.name)
                .unwrap_or_else(|| "unknown".to_string());

            Some(InstalledVersion::new(
                descriptor.ecosystem,
                home,
                version,
                provenance,
                source,
            ))
        })
        .collect()
}

/// Parse the property-list array printed by `java_home -X`
pub fn parse_registry_plist(content: &str) -> Vec<RegistryEntry> {
    content
        .split("<dict>")
        .skip(1)
        .filter_map(|dict| {
            let dict = dict.split("</dict>").next().unwrap_or(dict);
            let home = plist_value(dict, "JVMHomePath")?;
            Some(RegistryEntry {
                home_path: PathBuf::from(home),
                name: plist_value(dict, "JVMName"),
                version: plist_value(dict, "JVMVersion"),
            })
        })
        .collect()
}

fn plist_value(content: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r"<key>{}</key>\s*<string>([^<]*)</string>",
        regex::escape(key)
    );
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|value| unescape_xml(value.as_str().trim()))
        .filter(|value| !value.is_empty())
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystem::{descriptor, VersionManagerRoot};
    use crate::models::{Ecosystem, ManagerSlot};
    use crate::probe::DiskProbe;
    use crate::process::testing::ScriptedRunner;
    use std::path::Path;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN"
  "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<array>
	<dict>
		<key>JVMArch</key>
		<string>arm64</string>
		<key>JVMHomePath</key>
		<string>/Library/Java/JavaVirtualMachines/temurin-21.jdk/Contents/Home</string>
		<key>JVMName</key>
		<string>Eclipse Temurin 21</string>
		<key>JVMVersion</key>
		<string>21.0.1</string>
	</dict>
	<dict>
		<key>JVMName</key>
		<string>Broken &amp; Homeless</string>
	</dict>
	<dict>
		<key>JVMHomePath</key>
		<string>/Users/me/Library/Java/JavaVirtualMachines/corretto-17/Contents/Home</string>
		<key>JVMVersion</key>
		<string>17.0.9</string>
	</dict>
</array>
</plist>
"#;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_parse_registry_plist() {
        let entries = parse_registry_plist(SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].home_path,
            PathBuf::from("/Library/Java/JavaVirtualMachines/temurin-21.jdk/Contents/Home")
        );
        assert_eq!(entries[0].name.as_deref(), Some("Eclipse Temurin 21"));
        assert_eq!(entries[0].version.as_deref(), Some("21.0.1"));
        assert_eq!(entries[1].name, None);
    }

    #[test]
    fn test_malformed_output_yields_nothing() {
        assert!(parse_registry_plist("Unable to find any JVMs matching version").is_empty());
    }

    #[tokio::test]
    async fn test_registry_entries_are_classified() {
        let temp = TempDir::new().unwrap();
        let base = std::fs::canonicalize(temp.path()).unwrap();
        let user_jvms = base.join("Library/Java/JavaVirtualMachines");
        let system_home = base.join("System/jdk-21/Contents/Home");
        let user_home = user_jvms.join("corretto-17/Contents/Home");
        touch(&system_home.join("bin/java"));
        touch(&user_home.join("bin/java"));

        let plist = format!(
            "<array><dict><key>JVMHomePath</key><string>{}</string>\
             <key>JVMVersion</key><string>21.0.1</string></dict>\
             <dict><key>JVMHomePath</key><string>{}</string>\
             <key>JVMVersion</key><string>17.0.9</string></dict>\
             <dict><key>JVMHomePath</key><string>/nonexistent</string></dict></array>",
            system_home.display(),
            user_home.display()
        );
        let runner = ScriptedRunner::new();
        runner.on_output("java_home -X", &plist, "", true);

        let layout = EcosystemLayout {
            descriptor: descriptor(Ecosystem::Jdk),
            cellar_roots: Vec::new(),
            version_managers: vec![VersionManagerRoot {
                slot: ManagerSlot::Secondary,
                name: "user-jvms",
                root: user_jvms,
                nested: Some("Contents/Home"),
            }],
            reserved_paths: Vec::new(),
            fragment_path: PathBuf::from("/dev/null"),
            registry_helper: Some("java_home".to_string()),
            scan_system: false,
        };

        let found = scan(&layout, &DiskProbe, &runner, "java_home").await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].provenance, Provenance::System);
        assert_eq!(found[0].source, "java_home");
        assert_eq!(
            found[1].provenance,
            Provenance::VersionManager(ManagerSlot::Secondary)
        );
        assert_eq!(found[1].version, "17.0.9");
    }
}
