//! Per-ecosystem layout conventions.
//!
//! Everything that differs between JDK, Node.js, Python and Go lives in the
//! [`EcosystemDescriptor`] table; the scanners, writer, guard and manager are
//! shared and read their parameters from here.

use crate::config::Config;
use crate::models::{Ecosystem, ManagerSlot, Provenance};
use std::path::{Component, Path, PathBuf};

/// How a system binary reports its version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStyle {
    /// First output line starts with this text, followed by the version
    Prefixed(&'static str),
    /// A line containing `version "<x>"`
    Quoted,
}

#[derive(Debug, Clone, Copy)]
pub struct SystemQuery {
    pub program: &'static str,
    pub version_args: &'static [&'static str],
    pub style: VersionStyle,
    /// Command printing the installation root, when the binary can report it
    pub root_args: Option<&'static [&'static str]>,
}

#[derive(Debug, Clone, Copy)]
pub struct VersionManagerConvention {
    pub slot: ManagerSlot,
    pub name: &'static str,
    /// Environment variable overriding the manager's root
    pub env_var: Option<&'static str>,
    /// Manager root relative to the home directory
    pub default_dir: &'static str,
    /// Directory holding one child per version, relative to the manager root
    pub versions_subdir: &'static str,
    /// Install root inside each version directory
    pub nested: Option<&'static str>,
}

#[derive(Debug)]
pub struct EcosystemDescriptor {
    pub ecosystem: Ecosystem,
    /// Formula name; `<base>@<suffix>` variants match too
    pub package_base: &'static str,
    /// Local re-check applied to package manager search results
    pub search_pattern: &'static str,
    /// Install root relative to a cellar version directory
    pub cellar_home: &'static str,
    /// Expected binary relative to the install root
    pub binary: &'static str,
    /// Variable exported with the install root, if any
    pub home_var: Option<&'static str>,
    /// Release metadata file and key that carry the authoritative version
    pub release_metadata: Option<(&'static str, &'static str)>,
    pub system: SystemQuery,
    pub version_managers: [VersionManagerConvention; 2],
}

static DESCRIPTORS: [EcosystemDescriptor; 4] = [
    EcosystemDescriptor {
        ecosystem: Ecosystem::Jdk,
        package_base: "openjdk",
        search_pattern: r"^openjdk(@\d+)?$",
        cellar_home: "libexec/openjdk.jdk/Contents/Home",
        binary: "bin/java",
        home_var: Some("JAVA_HOME"),
        release_metadata: Some(("release", "JAVA_VERSION")),
        system: SystemQuery {
            program: "java",
            version_args: &["-version"],
            style: VersionStyle::Quoted,
            root_args: None,
        },
        version_managers: [
            VersionManagerConvention {
                slot: ManagerSlot::Primary,
                name: "sdkman",
                env_var: Some("SDKMAN_DIR"),
                default_dir: ".sdkman",
                versions_subdir: "candidates/java",
                nested: None,
            },
            VersionManagerConvention {
                slot: ManagerSlot::Secondary,
                name: "user-jvms",
                env_var: None,
                default_dir: "Library/Java/JavaVirtualMachines",
                versions_subdir: "",
                nested: Some("Contents/Home"),
            },
        ],
    },
    EcosystemDescriptor {
        ecosystem: Ecosystem::Node,
        package_base: "node",
        search_pattern: r"^node(@\d+)?$",
        cellar_home: "",
        binary: "bin/node",
        home_var: None,
        release_metadata: None,
        system: SystemQuery {
            program: "node",
            version_args: &["--version"],
            style: VersionStyle::Prefixed("v"),
            root_args: None,
        },
        version_managers: [
            VersionManagerConvention {
                slot: ManagerSlot::Primary,
                name: "nvm",
                env_var: Some("NVM_DIR"),
                default_dir: ".nvm",
                versions_subdir: "versions/node",
                nested: None,
            },
            VersionManagerConvention {
                slot: ManagerSlot::Secondary,
                name: "fnm",
                env_var: Some("FNM_DIR"),
                default_dir: ".local/share/fnm",
                versions_subdir: "node-versions",
                nested: Some("installation"),
            },
        ],
    },
    EcosystemDescriptor {
        ecosystem: Ecosystem::Python,
        package_base: "python",
        search_pattern: r"^python(@3\.\d+)?$",
        cellar_home: "",
        binary: "bin/python3",
        home_var: None,
        release_metadata: None,
        system: SystemQuery {
            program: "python3",
            version_args: &["--version"],
            style: VersionStyle::Prefixed("Python "),
            root_args: None,
        },
        version_managers: [
            VersionManagerConvention {
                slot: ManagerSlot::Primary,
                name: "pyenv",
                env_var: Some("PYENV_ROOT"),
                default_dir: ".pyenv",
                versions_subdir: "versions",
                nested: None,
            },
            VersionManagerConvention {
                slot: ManagerSlot::Secondary,
                name: "uv",
                env_var: Some("UV_PYTHON_INSTALL_DIR"),
                default_dir: ".local/share/uv/python",
                versions_subdir: "",
                nested: None,
            },
        ],
    },
    EcosystemDescriptor {
        ecosystem: Ecosystem::Go,
        package_base: "go",
        search_pattern: r"^go(@\d+\.\d+)?$",
        cellar_home: "libexec",
        binary: "bin/go",
        home_var: Some("GOROOT"),
        release_metadata: None,
        system: SystemQuery {
            program: "go",
            version_args: &["version"],
            style: VersionStyle::Prefixed("go version go"),
            root_args: Some(&["env", "GOROOT"]),
        },
        version_managers: [
            VersionManagerConvention {
                slot: ManagerSlot::Primary,
                name: "goenv",
                env_var: Some("GOENV_ROOT"),
                default_dir: ".goenv",
                versions_subdir: "versions",
                nested: None,
            },
            VersionManagerConvention {
                slot: ManagerSlot::Secondary,
                name: "gvm",
                env_var: Some("GVM_ROOT"),
                default_dir: ".gvm",
                versions_subdir: "gos",
                nested: None,
            },
        ],
    },
];

pub fn descriptor(ecosystem: Ecosystem) -> &'static EcosystemDescriptor {
    match ecosystem {
        Ecosystem::Jdk => &DESCRIPTORS[0],
        Ecosystem::Node => &DESCRIPTORS[1],
        Ecosystem::Python => &DESCRIPTORS[2],
        Ecosystem::Go => &DESCRIPTORS[3],
    }
}

impl EcosystemDescriptor {
    /// Whether a cellar package directory belongs to this ecosystem
    pub fn matches_package(&self, name: &str) -> bool {
        match name.strip_prefix(self.package_base) {
            Some("") => true,
            Some(rest) => rest.len() > 1 && rest.starts_with('@'),
            None => false,
        }
    }
}

/// A version manager root resolved for the current user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionManagerRoot {
    pub slot: ManagerSlot,
    pub name: &'static str,
    /// Directory whose children are version directories
    pub root: PathBuf,
    pub nested: Option<&'static str>,
}

/// Resolved locations for one ecosystem
#[derive(Debug, Clone)]
pub struct EcosystemLayout {
    pub descriptor: &'static EcosystemDescriptor,
    pub cellar_roots: Vec<PathBuf>,
    pub version_managers: Vec<VersionManagerRoot>,
    pub reserved_paths: Vec<PathBuf>,
    pub fragment_path: PathBuf,
    /// JDK registry helper, only set for the JDK ecosystem
    pub registry_helper: Option<String>,
    pub scan_system: bool,
}

impl EcosystemLayout {
    pub fn from_config(ecosystem: Ecosystem, config: &Config) -> Self {
        let descriptor = descriptor(ecosystem);
        let home = dirs::home_dir();

        let version_managers = descriptor
            .version_managers
            .iter()
            .filter_map(|convention| {
                let base = convention
                    .env_var
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|value| !value.is_empty())
                    .map(|value| PathBuf::from(shellexpand::tilde(&value).to_string()))
                    .or_else(|| home.as_ref().map(|h| h.join(convention.default_dir)))?;

                Some(VersionManagerRoot {
                    slot: convention.slot,
                    name: convention.name,
                    root: join_relative(&base, convention.versions_subdir),
                    nested: convention.nested,
                })
            })
            .collect();

        Self {
            descriptor,
            cellar_roots: config.cellar_root_paths(),
            version_managers,
            reserved_paths: config.reserved_path_list(),
            fragment_path: config.env_fragment_path(ecosystem),
            registry_helper: (ecosystem == Ecosystem::Jdk).then(|| config.java_home_helper.clone()),
            scan_system: config.scan_system,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.descriptor.ecosystem
    }

    pub fn version_manager(&self, slot: ManagerSlot) -> Option<&VersionManagerRoot> {
        self.version_managers.iter().find(|vm| vm.slot == slot)
    }

    /// Cellar root that `path` lies inside of
    pub fn owning_cellar(&self, path: &Path) -> Option<&Path> {
        self.cellar_roots
            .iter()
            .find(|root| is_strictly_inside(path, root))
            .map(PathBuf::as_path)
    }

    /// Provenance and source label for a path found outside the managed scans
    pub fn classify(&self, path: &Path) -> (Provenance, &'static str) {
        if self.owning_cellar(path).is_some() {
            return (Provenance::PackageManager, "homebrew");
        }
        for vm in &self.version_managers {
            if is_strictly_inside(path, &vm.root) {
                return (Provenance::VersionManager(vm.slot), vm.name);
            }
        }
        (Provenance::System, "system")
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.reserved_paths.iter().any(|reserved| path.starts_with(reserved))
    }
}

/// `path` is below `root` (not equal to it) and names no `..` component
pub fn is_strictly_inside(path: &Path, root: &Path) -> bool {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return false;
    }
    path != root && path.starts_with(root)
}

/// Join a relative convention path, treating "" as the base itself
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}
