use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding [`RegistryConfig::project_cache_size`].
pub const PROJECT_CACHE_SIZE_ENV_VAR: &str = "NOVA_MAVEN_PROJECT_CACHE_SIZE";

const DEFAULT_PROJECT_CACHE_SIZE: usize = 20;
const DEFAULT_MAX_RESOLUTION_PASSES: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_string())
    }
}

/// Tuning knobs for the project registry.
///
/// Every field is optional in TOML; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Maximum number of facade→project entries kept in the shared cache.
    pub project_cache_size: usize,
    /// Ignore any persisted registry snapshot at startup.
    pub update_projects_on_startup: bool,
    /// Upper bound on phase-2 passes before a refresh gives up converging.
    pub max_resolution_passes: usize,
    /// Where the persisted registry snapshot lives, if anywhere.
    pub state_file: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            project_cache_size: DEFAULT_PROJECT_CACHE_SIZE,
            update_projects_on_startup: false,
            max_resolution_passes: DEFAULT_MAX_RESOLUTION_PASSES,
            state_file: None,
        }
    }
}

impl RegistryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: RegistryConfig = toml::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = std::env::var_os(PROJECT_CACHE_SIZE_ENV_VAR) {
            match value.to_string_lossy().trim().parse::<usize>() {
                Ok(size) => self.project_cache_size = size,
                Err(err) => tracing::warn!(
                    target = "nova.maven.registry",
                    var = PROJECT_CACHE_SIZE_ENV_VAR,
                    error = %err,
                    "ignoring invalid project cache size override"
                ),
            }
        }
        self.normalize();
        self
    }

    fn normalize(&mut self) {
        self.project_cache_size = self.project_cache_size.max(1);
        self.max_resolution_passes = self.max_resolution_passes.max(1);
    }
}
