//! Runtime configuration: built-in defaults, then an optional TOML file,
//! then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::reconcile::{DateTimeFormat, InvalidDateFormat};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".reminder-manager";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "reminders.sqlite";
const LOG_FILE_NAME: &str = "reminder-manager.log";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate home directory")]
    NoHome,
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    DateFormat(#[from] InvalidDateFormat),
}

/// Settings the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub date_format: DateTimeFormat,
}

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub db_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub date_format: Option<String>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            log_path: data_dir.join(LOG_FILE_NAME),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            date_format: DateTimeFormat::default(),
        }
    }

    /// Resolve the full configuration. `config_path` of `None` means the
    /// default file in the data directory, which is allowed to be missing.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let data_dir = data_dir()?;
        let mut config = Self::with_data_dir(&data_dir);

        let file = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => {
                let default_path = data_dir.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Some(read_config_file(&default_path)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            config.merge_file(file)?;
        }

        config.merge_overrides(overrides);
        Ok(config)
    }

    pub fn merge_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(db_path) = file.db_path {
            self.db_path = db_path;
        }
        if let Some(log_path) = file.log_path {
            self.log_path = log_path;
        }
        if let Some(filter) = file.log_filter {
            self.log_filter = filter;
        }
        if let Some(pattern) = file.date_format {
            self.date_format = DateTimeFormat::new(pattern)?;
        }
        Ok(())
    }

    pub fn merge_overrides(&mut self, overrides: Overrides) {
        if let Some(db_path) = overrides.db_path {
            self.db_path = db_path;
        }
        if let Some(filter) = overrides.log_filter {
            self.log_filter = filter;
        }
    }
}

pub fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the application data directory inside the user's home.
fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHome)?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}
