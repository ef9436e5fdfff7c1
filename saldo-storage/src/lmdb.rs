//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the deepest backup
//! tier: a memory-mapped key-value store that survives restarts and
//! holds one snapshot per user, so a device shared by several accounts
//! keeps a recovery point for each of them.
//!
//! # Key layout
//!
//! Every record lives under a [`UserScopedKey`], `user ∥ 0xFF ∥ kind`.
//! Two record kinds are stored per user:
//!
//! - `Snapshot`: the serialized [`BalanceSnapshot`]
//! - `Stamp`: the snapshot's `loaded_at` as little-endian millis
//!
//! The stamp lets [`LmdbTier::prune_older_than`] age out stale users
//! without deserializing snapshot bodies.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use saldo_core::{BalanceSnapshot, SaldoError, SaldoResult, SnapshotSource, StorageError, UserId};

use crate::tier::BackupTier;
use crate::user_key::{RecordKind, UserScopedKey};

/// Error type for LMDB tier operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbTierError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbTierError> for SaldoError {
    fn from(e: LmdbTierError) -> Self {
        let tier = SnapshotSource::IndexedDb;
        let storage = match e {
            LmdbTierError::Serialization(reason) => StorageError::Serialization { tier, reason },
            LmdbTierError::Deserialization(reason) => StorageError::Serialization { tier, reason },
            // Env, database and transaction failures all mean the
            // backend itself is unhealthy.
            other => StorageError::BackendUnavailable {
                tier,
                reason: other.to_string(),
            },
        };
        SaldoError::Storage(storage)
    }
}

/// LMDB-backed backup tier with per-user key scoping.
pub struct LmdbTier {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbTier {
    /// Open (or create) the tier at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbTierError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbTierError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbTierError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Remove every record belonging to users whose stamp is older
    /// than `cutoff`. Returns the number of users pruned.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> SaldoResult<u64> {
        let cutoff_millis = cutoff.timestamp_millis();
        let mut stale_users = Vec::new();

        {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;
            let iter = self
                .db
                .iter(&rtxn)
                .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

            for result in iter {
                let (key, value) = match result {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let decoded = match UserScopedKey::decode(key) {
                    Some(decoded) => decoded,
                    None => continue,
                };
                if decoded.kind() != RecordKind::Stamp || value.len() < 8 {
                    continue;
                }
                let millis_bytes: [u8; 8] = value[0..8]
                    .try_into()
                    .map_err(|_| LmdbTierError::Deserialization("Invalid stamp".into()))?;
                if i64::from_le_bytes(millis_bytes) < cutoff_millis {
                    stale_users.push(decoded.user_id());
                }
            }
        }

        if stale_users.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        let mut pruned = 0u64;
        for user_id in &stale_users {
            let snapshot_key = UserScopedKey::new(*user_id, RecordKind::Snapshot).encode();
            let stamp_key = UserScopedKey::new(*user_id, RecordKind::Stamp).encode();
            let removed = self.db.delete(&mut wtxn, &snapshot_key).unwrap_or(false);
            let _ = self.db.delete(&mut wtxn, &stamp_key);
            if removed {
                pruned += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        tracing::debug!(pruned, "pruned stale snapshots from keyed store");
        Ok(pruned)
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbTierError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        for result in iter {
            match result {
                Ok((key, _)) => {
                    if key.len() >= prefix.len() && &key[0..prefix.len()] == prefix {
                        keys.push(key.to_vec());
                    }
                }
                Err(_) => continue,
            }
        }

        Ok(keys)
    }

    fn delete_user_records(&self, user_id: UserId) -> Result<bool, LmdbTierError> {
        let snapshot_key = UserScopedKey::new(user_id, RecordKind::Snapshot).encode();
        let stamp_key = UserScopedKey::new(user_id, RecordKind::Stamp).encode();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        let removed = self
            .db
            .delete(&mut wtxn, &snapshot_key)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;
        self.db
            .delete(&mut wtxn, &stamp_key)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        Ok(removed)
    }
}

#[async_trait]
impl BackupTier for LmdbTier {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::IndexedDb
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn put(&self, snapshot: &BalanceSnapshot) -> SaldoResult<()> {
        let snapshot_key = UserScopedKey::new(snapshot.user_id, RecordKind::Snapshot).encode();
        let stamp_key = UserScopedKey::new(snapshot.user_id, RecordKind::Stamp).encode();

        let value_bytes = serde_json::to_vec(snapshot)
            .map_err(|e| LmdbTierError::Serialization(e.to_string()))?;
        let stamp_bytes = snapshot.loaded_at.timestamp_millis().to_le_bytes();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, &snapshot_key, &value_bytes)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, &stamp_key, &stamp_bytes)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        let encoded_key = UserScopedKey::new(user_id, RecordKind::Snapshot).encode();

        let raw = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

            match self.db.get(&rtxn, &encoded_key) {
                Ok(Some(bytes)) => Some(bytes.to_vec()),
                Ok(None) => None,
                Err(e) => return Err(LmdbTierError::Transaction(e.to_string()).into()),
            }
        };

        let bytes = match raw {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let snapshot: BalanceSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| LmdbTierError::Deserialization(e.to_string()))?;

        // Keys are user-scoped, so a mismatch here means the store is
        // corrupted. Drop the record rather than serve it.
        if snapshot.user_id != user_id {
            tracing::warn!(
                requested = %user_id,
                owner = %snapshot.user_id,
                "evicting mis-keyed snapshot from keyed store"
            );
            self.delete_user_records(user_id)?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    async fn purge(&self, user_id: UserId) -> SaldoResult<u64> {
        let prefix = UserScopedKey::user_prefix(user_id);
        let keys_to_delete = self.collect_keys_with_prefix(&prefix)?;

        if keys_to_delete.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        let mut purged = 0u64;
        for key in &keys_to_delete {
            let is_snapshot = UserScopedKey::decode(key)
                .map(|decoded| decoded.kind() == RecordKind::Snapshot)
                .unwrap_or(false);
            if self.db.delete(&mut wtxn, key).unwrap_or(false) && is_snapshot {
                purged += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        Ok(purged)
    }

    async fn clear(&self) -> SaldoResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbTierError::Transaction(e.to_string()))?;

        Ok(())
    }
}
