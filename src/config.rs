use crate::error::{DevswitchError, Result};
use crate::models::Ecosystem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding config.toml and the environment fragments
    #[serde(skip)]
    pub config_dir: PathBuf,

    #[serde(skip)]
    pub config_file: PathBuf,

    /// Package manager cellar roots, scanned in order
    pub cellar_roots: Vec<String>,

    /// Package manager executable
    pub brew_command: String,

    /// Platform JDK registry helper
    pub java_home_helper: String,

    /// Paths whose installations are never removed
    pub reserved_paths: Vec<String>,

    /// Probe toolchains reachable through PATH
    pub scan_system: bool,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = Self::default_config_dir();

        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            cellar_roots: vec![
                "/opt/homebrew/Cellar".to_string(),
                "/usr/local/Cellar".to_string(),
            ],
            brew_command: "brew".to_string(),
            java_home_helper: "/usr/libexec/java_home".to_string(),
            reserved_paths: vec![
                "/Library/Java/JavaVirtualMachines".to_string(),
                "/System".to_string(),
                "/usr/bin".to_string(),
                "/usr/lib".to_string(),
                "/usr/libexec".to_string(),
            ],
            scan_system: true,
        }
    }
}

impl Config {
    fn default_config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEVSWITCH_DIR") {
            return PathBuf::from(shellexpand::tilde(&dir).to_string());
        }

        PathBuf::from(shellexpand::tilde("~/.config/devswitch").to_string())
    }

    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        std::fs::create_dir_all(&config.config_dir)?;

        if config.config_file.exists() {
            let contents = std::fs::read_to_string(&config.config_file)?;
            let file_config: Config = toml::from_str(&contents)?;

            config.cellar_roots = file_config.cellar_roots;
            config.brew_command = file_config.brew_command;
            config.java_home_helper = file_config.java_home_helper;
            config.reserved_paths = file_config.reserved_paths;
            config.scan_system = file_config.scan_system;
        } else {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| DevswitchError::ConfigError(e.to_string()))?;

        std::fs::write(&self.config_file, contents)?;
        Ok(())
    }

    pub fn cellar_root_paths(&self) -> Vec<PathBuf> {
        Self::expand_all(&self.cellar_roots)
    }

    pub fn reserved_path_list(&self) -> Vec<PathBuf> {
        Self::expand_all(&self.reserved_paths)
    }

    /// Location of the sourced environment fragment for an ecosystem
    pub fn env_fragment_path(&self, ecosystem: Ecosystem) -> PathBuf {
        self.config_dir.join(format!("{}_env.sh", ecosystem.as_str()))
    }

    fn expand_all(paths: &[String]) -> Vec<PathBuf> {
        paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.brew_command, "brew");
        assert!(config.scan_system);
        assert_eq!(config.cellar_roots.len(), 2);
    }

    #[test]
    fn test_env_fragment_path() {
        let mut config = Config::default();
        config.config_dir = PathBuf::from("/tmp/devswitch");
        assert_eq!(
            config.env_fragment_path(Ecosystem::Jdk),
            PathBuf::from("/tmp/devswitch/jdk_env.sh")
        );
        assert_eq!(
            config.env_fragment_path(Ecosystem::Go),
            PathBuf::from("/tmp/devswitch/go_env.sh")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("brew_command = \"/opt/homebrew/bin/brew\"").unwrap();
        assert_eq!(parsed.brew_command, "/opt/homebrew/bin/brew");
        assert_eq!(parsed.cellar_roots, Config::default().cellar_roots);
    }
}
