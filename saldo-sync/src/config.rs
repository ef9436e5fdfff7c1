//! Sync layer configuration.

use std::path::PathBuf;
use std::time::Duration;

use saldo_core::ConfigError;

/// Configuration for the sync layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the balance API.
    pub base_url: String,
    /// Hard timeout for one balance fetch.
    pub fetch_timeout: Duration,
    /// Directory holding the slot files and the LMDB environment.
    pub data_dir: PathBuf,
    /// Maximum size of the LMDB environment in megabytes.
    pub lmdb_max_size_mb: usize,
    /// Optional TOML override for the emergency defaults table.
    pub emergency_defaults_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            fetch_timeout: Duration::from_secs(10),
            data_dir: PathBuf::from("./saldo-data"),
            lmdb_max_size_mb: 50,
            emergency_defaults_path: None,
        }
    }
}

impl SyncConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the LMDB size cap.
    pub fn with_lmdb_max_size_mb(mut self, mb: usize) -> Self {
        self.lmdb_max_size_mb = mb;
        self
    }

    /// Set the emergency defaults override file.
    pub fn with_emergency_defaults_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.emergency_defaults_path = Some(path.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "base_url".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.lmdb_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
