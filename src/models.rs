use crate::error::DevswitchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Managed toolchain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Jdk,
    Node,
    Python,
    Go,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 4] = [
        Ecosystem::Jdk,
        Ecosystem::Node,
        Ecosystem::Python,
        Ecosystem::Go,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Jdk => "jdk",
            Ecosystem::Node => "node",
            Ecosystem::Python => "python",
            Ecosystem::Go => "go",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Jdk => "JDK",
            Ecosystem::Node => "Node.js",
            Ecosystem::Python => "Python",
            Ecosystem::Go => "Go",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = DevswitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jdk" | "java" => Ok(Ecosystem::Jdk),
            "node" | "nodejs" | "node.js" => Ok(Ecosystem::Node),
            "python" | "python3" => Ok(Ecosystem::Python),
            "go" | "golang" => Ok(Ecosystem::Go),
            other => Err(DevswitchError::UnknownEcosystem(other.to_string())),
        }
    }
}

/// Which of an ecosystem's two per-user version managers found an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerSlot {
    Primary,
    Secondary,
}

/// Discovery source of an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    PackageManager,
    VersionManager(ManagerSlot),
    System,
}

/// Opaque identifier, unique within one scan result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(u64);

static NEXT_VERSION_ID: AtomicU64 = AtomicU64::new(1);

impl VersionId {
    pub fn next() -> Self {
        Self(NEXT_VERSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One discovered toolchain installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub id: VersionId,
    pub ecosystem: Ecosystem,
    pub install_root: PathBuf,
    pub version: String,
    pub provenance: Provenance,
    /// Human readable source label (e.g. "homebrew", "nvm", "system")
    pub source: String,
}

impl InstalledVersion {
    pub fn new(
        ecosystem: Ecosystem,
        install_root: PathBuf,
        version: impl Into<String>,
        provenance: Provenance,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: VersionId::next(),
            ecosystem,
            install_root,
            version: version.into(),
            provenance,
            source: source.into(),
        }
    }

    /// Whether both values describe the same installation.
    ///
    /// Ids are regenerated by every scan, so the install root is compared too.
    pub fn is_same_installation(&self, other: &InstalledVersion) -> bool {
        self.id == other.id || self.install_root == other.install_root
    }
}

/// Installations of one ecosystem plus the active pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcosystemInventory {
    pub ecosystem: Ecosystem,
    pub versions: Vec<InstalledVersion>,
    pub active: Option<VersionId>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl EcosystemInventory {
    pub fn empty(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            versions: Vec::new(),
            active: None,
            refreshed_at: None,
        }
    }

    /// The active installation; a dangling pointer counts as none
    pub fn active_version(&self) -> Option<&InstalledVersion> {
        let active = self.active?;
        self.versions.iter().find(|v| v.id == active)
    }

    pub fn get(&self, id: VersionId) -> Option<&InstalledVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Current entry for `version`, which may come from an earlier scan
    pub fn current_entry(&self, version: &InstalledVersion) -> Option<&InstalledVersion> {
        self.get(version.id).or_else(|| {
            self.versions
                .iter()
                .find(|v| v.install_root == version.install_root)
        })
    }

    /// Find an installation by its version label or install root
    pub fn find(&self, query: &str) -> Option<&InstalledVersion> {
        self.versions
            .iter()
            .find(|v| v.version == query)
            .or_else(|| {
                self.versions
                    .iter()
                    .find(|v| v.install_root.to_string_lossy() == query)
            })
    }
}

/// A version known to the package manager, not necessarily installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCatalogEntry {
    pub ecosystem: Ecosystem,
    pub formula_identifier: String,
    pub resolved_version: String,
    pub is_installed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_parsing() {
        assert_eq!("java".parse::<Ecosystem>().unwrap(), Ecosystem::Jdk);
        assert_eq!("Node".parse::<Ecosystem>().unwrap(), Ecosystem::Node);
        assert_eq!("golang".parse::<Ecosystem>().unwrap(), Ecosystem::Go);
        assert!("ruby".parse::<Ecosystem>().is_err());
    }

    #[test]
    fn test_version_ids_are_unique() {
        let a = InstalledVersion::new(
            Ecosystem::Node,
            PathBuf::from("/a"),
            "1",
            Provenance::System,
            "system",
        );
        let b = InstalledVersion::new(
            Ecosystem::Node,
            PathBuf::from("/a"),
            "1",
            Provenance::System,
            "system",
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_dangling_active_pointer_is_none() {
        let version = InstalledVersion::new(
            Ecosystem::Go,
            PathBuf::from("/opt/go"),
            "1.22.0",
            Provenance::System,
            "system",
        );
        let mut inventory = EcosystemInventory::empty(Ecosystem::Go);
        inventory.versions.push(version.clone());
        inventory.active = Some(VersionId::next());
        assert!(inventory.active_version().is_none());

        inventory.active = Some(version.id);
        assert_eq!(inventory.active_version(), Some(&version));
    }

    #[test]
    fn test_rescanned_entry_is_the_same_installation() {
        let first = InstalledVersion::new(
            Ecosystem::Node,
            PathBuf::from("/u/.nvm/versions/node/v20.11.0"),
            "v20.11.0",
            Provenance::VersionManager(ManagerSlot::Primary),
            "nvm",
        );
        let rescanned = InstalledVersion::new(
            Ecosystem::Node,
            first.install_root.clone(),
            "v20.11.0",
            Provenance::VersionManager(ManagerSlot::Primary),
            "nvm",
        );
        assert_ne!(first.id, rescanned.id);
        assert!(first.is_same_installation(&rescanned));

        let mut inventory = EcosystemInventory::empty(Ecosystem::Node);
        inventory.versions.push(rescanned.clone());
        assert_eq!(inventory.current_entry(&first), Some(&rescanned));

        let gone = InstalledVersion::new(
            Ecosystem::Node,
            PathBuf::from("/u/.nvm/versions/node/v16.0.0"),
            "v16.0.0",
            Provenance::VersionManager(ManagerSlot::Primary),
            "nvm",
        );
        assert!(inventory.current_entry(&gone).is_none());
    }
}
