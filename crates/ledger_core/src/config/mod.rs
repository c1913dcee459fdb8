use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "LEDGER_CONFIG_PATH";

/// Identity the CLI acts with when flags don't say otherwise.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pairing_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<LedgerError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub pairing_id: Option<String>,
    pub user_id: Option<String>,
}

pub fn config_path() -> Result<PathBuf, LedgerError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| LedgerError::storage_unavailable("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("ledger").join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| LedgerError::storage_unavailable("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("ledger")
            .join(CONFIG_FILE_NAME))
    }
}

/// Loads the config, degrading to defaults when the file is missing or
/// unreadable; the error rides along so callers can report it.
pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, LedgerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| LedgerError::storage_unavailable(format!("{}: {}", path.display(), err)))?;
    serde_json::from_str(&content).map_err(|err| {
        LedgerError::validation_rejected(format!("invalid JSON in {}: {}", path.display(), err))
    })
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(pairing_id) = overrides.pairing_id.as_ref() {
        merged.pairing_id = Some(pairing_id.clone());
    }
    if let Some(user_id) = overrides.user_id.as_ref() {
        merged.user_id = Some(user_id.clone());
    }
    merged
}
