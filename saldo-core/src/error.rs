//! Error types for balance sync operations

use crate::SnapshotSource;
use thiserror::Error;

/// Balance fetch errors.
///
/// Transport-level causes are carried as strings so the type stays
/// `Clone + PartialEq`; the HTTP client stringifies at the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Balance endpoint returned status {status}")]
    HttpStatus { status: u16 },

    #[error("Fetch rejected by server: {message}")]
    Rejected { message: String },

    #[error("Malformed balance payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Fetch timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Backup tier errors.
///
/// Tier failures are non-fatal by contract: the orchestrator logs them
/// and moves on to the next tier. The `tier` field names the layer that
/// failed using its provenance tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Read failed on tier {tier}: {reason}")]
    ReadFailed { tier: SnapshotSource, reason: String },

    #[error("Write failed on tier {tier}: {reason}")]
    WriteFailed { tier: SnapshotSource, reason: String },

    #[error("Serialization failed on tier {tier}: {reason}")]
    Serialization { tier: SnapshotSource, reason: String },

    #[error("Backend unavailable for tier {tier}: {reason}")]
    BackendUnavailable { tier: SnapshotSource, reason: String },
}

impl StorageError {
    /// Which tier produced this error.
    pub fn tier(&self) -> SnapshotSource {
        match self {
            StorageError::ReadFailed { tier, .. }
            | StorageError::WriteFailed { tier, .. }
            | StorageError::Serialization { tier, .. }
            | StorageError::BackendUnavailable { tier, .. } => *tier,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Master error type for all balance sync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaldoError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for balance sync operations.
pub type SaldoResult<T> = Result<T, SaldoError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_timeout() {
        let err = FetchError::Timeout { elapsed_ms: 10_000 };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("10000"));
    }

    #[test]
    fn test_fetch_error_display_rejected() {
        let err = FetchError::Rejected {
            message: "session expired".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("rejected"));
        assert!(msg.contains("session expired"));
    }

    #[test]
    fn test_storage_error_display_names_tier() {
        let err = StorageError::ReadFailed {
            tier: SnapshotSource::IndexedDb,
            reason: "mdb_get failed".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Read failed"));
        assert!(msg.contains("indexed_db"));
        assert!(msg.contains("mdb_get failed"));
    }

    #[test]
    fn test_storage_error_tier_accessor() {
        let err = StorageError::WriteFailed {
            tier: SnapshotSource::LocalBackup,
            reason: "disk full".to_string(),
        };
        assert_eq!(err.tier(), SnapshotSource::LocalBackup);
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "fetch_timeout_secs".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("fetch_timeout_secs"));
        assert!(msg.contains("0"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_saldo_error_from_variants() {
        let fetch = SaldoError::from(FetchError::HttpStatus { status: 503 });
        assert!(matches!(fetch, SaldoError::Fetch(_)));

        let storage = SaldoError::from(StorageError::ReadFailed {
            tier: SnapshotSource::SessionBackup,
            reason: "evicted".to_string(),
        });
        assert!(matches!(storage, SaldoError::Storage(_)));

        let config = SaldoError::from(ConfigError::MissingRequired {
            field: "default_network".to_string(),
        });
        assert!(matches!(config, SaldoError::Config(_)));
    }
}
