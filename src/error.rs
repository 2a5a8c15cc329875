use crate::models::Ecosystem;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevswitchError {
    #[error("Unknown ecosystem: {0}")]
    UnknownEcosystem(String),

    #[error("Version {0} not found")]
    VersionNotFound(String),

    #[error("Failed to write environment file {path}: {source}")]
    EnvironmentWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Uninstall rejected: {0}")]
    UninstallRejected(String),

    #[error("Another operation is already running for {0}")]
    OperationInProgress(Ecosystem),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DevswitchError>;
