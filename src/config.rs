//! Configuration for partner-academy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LearningError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("partner-academy")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,

    /// How long a connection waits on a locked database before failing
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Fraction of the video duration that counts as watched
    #[serde(default = "default_watch_threshold")]
    pub watch_threshold: f64,

    /// Leading segment of issued certificate numbers
    #[serde(default = "default_certificate_prefix")]
    pub certificate_prefix: String,

    /// Course catalog JSON imported at startup
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

fn default_http_port() -> u16 {
    8095
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_watch_threshold() -> f64 {
    0.8
}

fn default_certificate_prefix() -> String {
    "CERT".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
            db_pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout(),
            watch_threshold: default_watch_threshold(),
            certificate_prefix: default_certificate_prefix(),
            catalog_path: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), LearningError> {
        if !(self.watch_threshold > 0.0 && self.watch_threshold <= 1.0) {
            return Err(LearningError::Config(format!(
                "watch_threshold must be in (0, 1], got {}",
                self.watch_threshold
            )));
        }
        if self.certificate_prefix.trim().is_empty() {
            return Err(LearningError::Config("certificate_prefix must not be empty".into()));
        }
        if self.db_pool_size == 0 {
            return Err(LearningError::Config("db_pool_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("academy.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
