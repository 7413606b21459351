use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The mutable registry's base was superseded by a newer commit, or it was
    /// touched from a thread other than the one running the refresh.
    #[error("mutable project registry is stale")]
    Stale,

    #[error("registry operation was cancelled")]
    Cancelled,

    #[error("failed to access registry state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode registry state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RegistryError {
    pub fn is_stale(&self) -> bool {
        matches!(self, RegistryError::Stale)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RegistryError::Cancelled)
    }
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// A recoverable failure reported by a dependency resolver.
///
/// The refresh records it as a diagnostic and carries on with whatever
/// requirements the resolver produced before failing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to resolve dependencies of {project}: {message}")]
pub struct ResolutionError {
    pub project: String,
    pub message: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot acquire build container for {descriptor}: {message}")]
pub struct ContainerError {
    pub descriptor: String,
    pub message: String,
}
