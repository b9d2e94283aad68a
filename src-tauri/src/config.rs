//! Application configuration (`{config_dir}/hkmap/config.json`).
//!
//! Every field has a default, so a partial file or no file at all is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::follow_controller::FollowConfig;
use crate::geocode::GeocoderConfig;
use crate::location::LocationConfig;
use crate::style::StyleConfig;

const CONFIG_DIR_NAME: &str = "hkmap";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub follow: FollowConfig,
    pub location: LocationConfig,
    pub geocoder: GeocoderConfig,
    pub style: StyleConfig,
}

impl AppConfig {
    /// Loads the user config, falling back to defaults on any problem.
    pub fn load() -> AppConfig {
        let Some(path) = default_config_path() else {
            log::warn!("config: cannot resolve config directory, using defaults");
            return AppConfig::default();
        };
        if !path.exists() {
            log::info!("config: {} not found, using defaults", path.display());
            return AppConfig::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("config: loaded {}", path.display());
                config
            }
            Err(err) => {
                log::warn!("config: {err}; using defaults");
                AppConfig::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
