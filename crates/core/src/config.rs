//! Engine configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file
//! (`BATCHWRIGHT_CONFIG`, else `<data_dir>/config.toml`), then environment
//! overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Units processed per Worker call when nothing overrides it.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default HTTP port for `batchwright serve`.
pub const DEFAULT_PORT: u16 = 47893;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Settings that shape how the engine stores and advances jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Holds `status.json`, `status.lock` and `staging/`.
    pub data_dir: PathBuf,
    /// Maximum units consumed by one Worker call.
    pub batch_size: usize,
}

/// Settings for the HTTP front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Root of the directory storage that backup jobs upload into.
    pub backup_dir: PathBuf,
}

/// Full application config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    batch_size: Option<usize>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Config rooted at an explicit directory (tests, embedded use).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl AppConfig {
    /// Load from defaults, config file and process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::load`] with an injectable environment lookup.
    pub fn load_from(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default_dir = match env("BATCHWRIGHT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => crate::paths::app_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let file_path = env("BATCHWRIGHT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_dir.join("config.toml"));
        let file = read_file_config(&file_path)?;

        let data_dir = env("BATCHWRIGHT_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or(default_dir);

        let batch_size = match env("BATCHWRIGHT_BATCH_SIZE") {
            Some(raw) => parse_env("BATCHWRIGHT_BATCH_SIZE", &raw)?,
            None => file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        };
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "batch_size",
                message: "must be at least 1".into(),
            });
        }

        let port = match env("BATCHWRIGHT_PORT") {
            Some(raw) => parse_env("BATCHWRIGHT_PORT", &raw)?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let db_path = env("BATCHWRIGHT_DB")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("batchwright.db"));

        let backup_dir = env("BATCHWRIGHT_BACKUP_DIR")
            .map(PathBuf::from)
            .or(file.backup_dir)
            .unwrap_or_else(|| data_dir.join("backups"));

        Ok(Self {
            engine: EngineConfig {
                data_dir,
                batch_size,
            },
            server: ServerConfig {
                port,
                db_path,
                backup_dir,
            },
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            })
        }
    };
    toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

fn parse_env<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("'{raw}': {e}"),
    })
}
