//! Durable slot-file tier.
//!
//! Two named JSON slots on disk, `current.json` and `last_known.json`,
//! written atomically via temp file + rename so a crash mid-write can
//! never leave a torn slot. The slots are deliberately distinct: a
//! corrupted or junk current write cannot shadow a previously good
//! snapshot, because `last_known` only ever updates by promotion of a
//! current snapshot that was valid for the same user.
//!
//! The store also keeps the emergency marker, a small diagnostic record
//! noting the last time emergency defaults had to be served.

use async_trait::async_trait;
use saldo_core::{
    BalanceSnapshot, SaldoResult, SnapshotSource, StorageError, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::tier::BackupTier;

/// File name of the most recent snapshot slot.
pub const CURRENT_SLOT: &str = "current.json";
/// File name of the promoted previously-good snapshot slot.
pub const LAST_KNOWN_SLOT: &str = "last_known.json";
/// File name of the emergency diagnostic marker.
pub const EMERGENCY_MARKER: &str = "emergency_marker.json";

/// Diagnostic record written whenever emergency defaults were served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyMarker {
    pub user_id: UserId,
    #[serde(rename = "timestamp")]
    pub at: Timestamp,
    pub reason: String,
}

/// Owner of the slot files. Shared by the two slot tiers and the
/// orchestrator (for the emergency marker).
#[derive(Debug)]
pub struct SlotStore {
    dir: PathBuf,
    // Serializes writers; reads of atomically-renamed files are safe
    // without it, but eviction on a foreign read is a write.
    lock: Mutex<()>,
}

impl SlotStore {
    /// Create a store rooted at `dir`. The directory is created lazily
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn slot_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write a snapshot to the current slot, first promoting the
    /// previous current to `last_known` when it was valid for the same
    /// user.
    pub async fn put_current(&self, snapshot: &BalanceSnapshot) -> SaldoResult<()> {
        let _guard = self.lock.lock().await;
        let current_path = self.slot_path(CURRENT_SLOT);

        match read_slot(&current_path, SnapshotSource::LocalBackup) {
            Ok(Some(previous)) if previous.is_valid_for(snapshot.user_id) => {
                write_json(
                    &self.slot_path(LAST_KNOWN_SLOT),
                    &previous,
                    SnapshotSource::LastKnown,
                )?;
            }
            Ok(_) => {}
            Err(e) => {
                // Unreadable current slot: skip promotion, the write
                // below replaces it anyway.
                tracing::debug!(error = %e, "skipping promotion of unreadable current slot");
            }
        }

        write_json(&current_path, snapshot, SnapshotSource::LocalBackup)?;
        Ok(())
    }

    pub async fn get_current(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        self.get_slot(CURRENT_SLOT, SnapshotSource::LocalBackup, user_id)
            .await
    }

    pub async fn get_last_known(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        self.get_slot(LAST_KNOWN_SLOT, SnapshotSource::LastKnown, user_id)
            .await
    }

    async fn get_slot(
        &self,
        name: &str,
        tier: SnapshotSource,
        user_id: UserId,
    ) -> SaldoResult<Option<BalanceSnapshot>> {
        let _guard = self.lock.lock().await;
        let path = self.slot_path(name);
        match read_slot(&path, tier)? {
            Some(held) if held.user_id == user_id => Ok(Some(held)),
            Some(held) => {
                tracing::warn!(
                    requested = %user_id,
                    owner = %held.user_id,
                    slot = name,
                    "evicting foreign snapshot from slot file"
                );
                remove_if_exists(&path, tier)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn purge_current(&self, user_id: UserId) -> SaldoResult<u64> {
        self.purge_slot(CURRENT_SLOT, SnapshotSource::LocalBackup, user_id)
            .await
    }

    pub async fn purge_last_known(&self, user_id: UserId) -> SaldoResult<u64> {
        self.purge_slot(LAST_KNOWN_SLOT, SnapshotSource::LastKnown, user_id)
            .await
    }

    async fn purge_slot(
        &self,
        name: &str,
        tier: SnapshotSource,
        user_id: UserId,
    ) -> SaldoResult<u64> {
        let _guard = self.lock.lock().await;
        let path = self.slot_path(name);
        match read_slot(&path, tier) {
            Ok(Some(held)) if held.user_id == user_id => {
                remove_if_exists(&path, tier)?;
                Ok(1)
            }
            Ok(_) => Ok(0),
            Err(_) => {
                // Unreadable records serve nobody; drop them on purge.
                remove_if_exists(&path, tier)?;
                Ok(0)
            }
        }
    }

    pub async fn clear_current(&self) -> SaldoResult<()> {
        let _guard = self.lock.lock().await;
        remove_if_exists(&self.slot_path(CURRENT_SLOT), SnapshotSource::LocalBackup)?;
        Ok(())
    }

    pub async fn clear_last_known(&self) -> SaldoResult<()> {
        let _guard = self.lock.lock().await;
        remove_if_exists(&self.slot_path(LAST_KNOWN_SLOT), SnapshotSource::LastKnown)?;
        Ok(())
    }

    /// Record that emergency defaults were served.
    pub async fn record_emergency(
        &self,
        user_id: UserId,
        at: Timestamp,
        reason: &str,
    ) -> SaldoResult<()> {
        let _guard = self.lock.lock().await;
        let marker = EmergencyMarker {
            user_id,
            at,
            reason: reason.to_string(),
        };
        write_json(
            &self.slot_path(EMERGENCY_MARKER),
            &marker,
            SnapshotSource::Emergency,
        )?;
        Ok(())
    }

    /// The most recent emergency marker, if one is on disk.
    pub async fn last_emergency(&self) -> SaldoResult<Option<EmergencyMarker>> {
        let _guard = self.lock.lock().await;
        let path = self.slot_path(EMERGENCY_MARKER);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| StorageError::ReadFailed {
            tier: SnapshotSource::Emergency,
            reason: e.to_string(),
        })?;
        let marker = serde_json::from_str(&raw).map_err(|e| StorageError::Serialization {
            tier: SnapshotSource::Emergency,
            reason: e.to_string(),
        })?;
        Ok(Some(marker))
    }

    /// Drop the emergency marker. Called after the next successful sync.
    pub async fn clear_emergency_marker(&self) -> SaldoResult<()> {
        let _guard = self.lock.lock().await;
        remove_if_exists(&self.slot_path(EMERGENCY_MARKER), SnapshotSource::Emergency)?;
        Ok(())
    }
}

/// Read and parse one slot file. Absent file is a plain miss.
fn read_slot(path: &Path, tier: SnapshotSource) -> Result<Option<BalanceSnapshot>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| StorageError::ReadFailed {
        tier,
        reason: e.to_string(),
    })?;
    let snapshot = serde_json::from_str(&raw).map_err(|e| StorageError::Serialization {
        tier,
        reason: e.to_string(),
    })?;
    Ok(Some(snapshot))
}

/// Atomic JSON write: temp file in the same directory, fsync, rename.
fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    tier: SnapshotSource,
) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::WriteFailed {
            tier,
            reason: e.to_string(),
        })?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::Serialization {
        tier,
        reason: e.to_string(),
    })?;

    let temp_path = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };
    write().map_err(|e| StorageError::WriteFailed {
        tier,
        reason: e.to_string(),
    })
}

fn remove_if_exists(path: &Path, tier: SnapshotSource) -> Result<(), StorageError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| StorageError::WriteFailed {
            tier,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

// ============================================================================
// TIER ADAPTERS
// ============================================================================

/// The `current` slot as a backup tier (`local_backup`).
pub struct CurrentSlotTier {
    store: Arc<SlotStore>,
}

impl CurrentSlotTier {
    pub fn new(store: Arc<SlotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BackupTier for CurrentSlotTier {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::LocalBackup
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn put(&self, snapshot: &BalanceSnapshot) -> SaldoResult<()> {
        self.store.put_current(snapshot).await
    }

    async fn get(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        self.store.get_current(user_id).await
    }

    async fn purge(&self, user_id: UserId) -> SaldoResult<u64> {
        self.store.purge_current(user_id).await
    }

    async fn clear(&self) -> SaldoResult<()> {
        self.store.clear_current().await
    }
}

/// The `last_known` slot as a backup tier.
///
/// `put` is intentionally a no-op: the slot is only written by promotion
/// inside [`SlotStore::put_current`], so a bad write to `current` can
/// never overwrite the previously good snapshot held here.
pub struct LastKnownSlotTier {
    store: Arc<SlotStore>,
}

impl LastKnownSlotTier {
    pub fn new(store: Arc<SlotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BackupTier for LastKnownSlotTier {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::LastKnown
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn put(&self, _snapshot: &BalanceSnapshot) -> SaldoResult<()> {
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        self.store.get_last_known(user_id).await
    }

    async fn purge(&self, user_id: UserId) -> SaldoResult<u64> {
        self.store.purge_last_known(user_id).await
    }

    async fn clear(&self) -> SaldoResult<()> {
        self.store.clear_last_known().await
    }
}
