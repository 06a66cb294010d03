//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::Config;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read and parse a JSON configuration file.
pub fn try_load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a configuration file, falling back to [`Config::default`] on any
/// read or parse failure.
///
/// The failure is reported through `tracing` only; callers always get a
/// usable value.
pub fn load_config(path: &Path) -> Config {
    match try_load_config(path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), log_level = %config.log_level, "Loaded config from file");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    }
}
