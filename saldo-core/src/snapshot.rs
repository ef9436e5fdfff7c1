//! Balance snapshot - the unit of truth for the sync layer.
//!
//! A snapshot is one complete, self-consistent view of a user's token
//! balances at a point in time. Snapshots are replaced whole, never
//! partially patched, so readers can never observe torn state.
//!
//! The serialized field names (`userId`, `balancesTable`, `timestamp`,
//! `syncStatus`, ...) are fixed: persisted tier records and the balance
//! API wire format already use them.

use crate::{Address, Network, Timestamp, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Outcome classification of the sync attempt that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Fresh data straight from the balance API.
    Success,
    /// The fetch failed; the snapshot came from a backup tier.
    Error,
    /// Every backup tier missed; the snapshot is the emergency floor.
    Emergency,
    /// A refresh is in flight while this snapshot is still being served.
    Updating,
}

impl SyncStatus {
    /// The serialized tag, also used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Emergency => "emergency",
            SyncStatus::Updating => "updating",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(SyncStatus::Success),
            "error" => Ok(SyncStatus::Error),
            "emergency" => Ok(SyncStatus::Emergency),
            "updating" => Ok(SyncStatus::Updating),
            _ => Err(format!("Invalid SyncStatus: {}", s)),
        }
    }
}

/// Provenance of a snapshot: which layer produced it.
///
/// The serialized tags are the product's historical names and must not
/// change; diagnostics and support tooling key off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Straight from the remote balance endpoint.
    Api,
    /// Ephemeral in-process tier.
    SessionBackup,
    /// Durable slot-file tier, `current` slot.
    LocalBackup,
    /// Durable slot-file tier, `last_known` slot.
    LastKnown,
    /// Durable keyed store (LMDB).
    IndexedDb,
    /// Synthesized emergency defaults.
    Emergency,
}

impl SnapshotSource {
    /// The serialized tag, also used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Api => "api",
            SnapshotSource::SessionBackup => "session_backup",
            SnapshotSource::LocalBackup => "local_backup",
            SnapshotSource::LastKnown => "last_known",
            SnapshotSource::IndexedDb => "indexed_db",
            SnapshotSource::Emergency => "emergency",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One complete view of a user's token balances at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    /// Owner of the snapshot; checked on every tier read.
    pub user_id: UserId,
    /// Chain/environment the balances were read against.
    pub network: Network,
    /// Account address the snapshot was computed for.
    pub address: Address,
    /// Token symbol to decimal-string amount. Ordered for stable output.
    #[serde(rename = "balancesTable")]
    pub balances: BTreeMap<String, String>,
    /// Snapshot creation instant.
    #[serde(rename = "timestamp")]
    pub loaded_at: Timestamp,
    /// Outcome of the sync attempt that produced this snapshot.
    #[serde(rename = "syncStatus")]
    pub status: SyncStatus,
    /// Human-readable cause, present only when status is not `success`.
    #[serde(rename = "syncError", skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Which layer produced this snapshot.
    pub source: SnapshotSource,
    /// True only for snapshots synthesized from emergency defaults.
    pub is_emergency: bool,
}

impl BalanceSnapshot {
    /// Build a fresh snapshot from a successful API fetch.
    pub fn from_api(
        user_id: UserId,
        network: Network,
        address: Address,
        balances: BTreeMap<String, String>,
    ) -> Self {
        Self {
            user_id,
            network,
            address,
            balances,
            loaded_at: Utc::now(),
            status: SyncStatus::Success,
            error: None,
            source: SnapshotSource::Api,
            is_emergency: false,
        }
    }

    /// The validity predicate applied at every tier: the balance table has
    /// at least one entry and the snapshot belongs to the given user.
    pub fn is_valid_for(&self, user_id: UserId) -> bool {
        self.user_id == user_id && !self.balances.is_empty()
    }

    /// Whether the balance table has at least one entry.
    pub fn has_balances(&self) -> bool {
        !self.balances.is_empty()
    }

    /// Raw amount for a symbol, if present.
    pub fn balance_of(&self, symbol: &str) -> Option<&str> {
        self.balances.get(symbol).map(String::as_str)
    }

    /// How old this snapshot is. Clock skew clamps to zero.
    pub fn age(&self) -> Duration {
        let now = Utc::now();
        if now > self.loaded_at {
            (now - self.loaded_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Copy of this snapshot restamped as served-from-backup.
    ///
    /// Balances and `loaded_at` keep the stored values so consumers can
    /// show how old the served data actually is; only the status fields
    /// change.
    pub fn degraded(&self, source: SnapshotSource, reason: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.status = SyncStatus::Error;
        copy.error = Some(reason.into());
        copy.source = source;
        copy
    }
}
