//! Backup orchestrator: write-through persistence and total recovery.
//!
//! The orchestrator owns the ordered tier chain. `persist` writes a
//! snapshot through every tier best-effort; `recover` walks the chain
//! in priority order and always produces a snapshot, falling back to
//! the emergency defaults when every tier misses. Neither operation
//! ever surfaces an error to the caller; tier failures are logged,
//! counted, and treated as misses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use saldo_core::{
    BalanceSnapshot, EmergencyDefaults, SaldoResult, SnapshotSource, SyncStatus, UserId,
};

use crate::lmdb::LmdbTier;
use crate::memory::MemoryTier;
use crate::slots::{CurrentSlotTier, EmergencyMarker, LastKnownSlotTier, SlotStore};
use crate::tier::BackupTier;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for persistence and recovery activity.
///
/// Incremented with relaxed ordering; exact cross-field consistency is
/// not needed, these feed logs and diagnostics only.
#[derive(Debug, Default)]
pub struct RecoveryMetrics {
    /// Total `persist` calls since startup.
    pub persist_attempts: AtomicU64,

    /// Individual tier writes that failed during `persist`.
    pub persist_tier_failures: AtomicU64,

    /// Recoveries served from the in-memory session tier.
    pub session_backup_hits: AtomicU64,

    /// Recoveries served from the `current` slot file.
    pub local_backup_hits: AtomicU64,

    /// Recoveries served from the `last_known` slot file.
    pub last_known_hits: AtomicU64,

    /// Recoveries served from the LMDB keyed store.
    pub indexed_db_hits: AtomicU64,

    /// Recoveries that exhausted every tier and served defaults.
    pub emergencies_served: AtomicU64,

    /// Tier reads that failed and were downgraded to misses.
    pub tier_read_failures: AtomicU64,

    /// Owned-but-unusable records dropped during recovery.
    pub invalid_records_purged: AtomicU64,
}

impl RecoveryMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self, source: SnapshotSource) {
        match source {
            SnapshotSource::SessionBackup => {
                self.session_backup_hits.fetch_add(1, Ordering::Relaxed);
            }
            SnapshotSource::LocalBackup => {
                self.local_backup_hits.fetch_add(1, Ordering::Relaxed);
            }
            SnapshotSource::LastKnown => {
                self.last_known_hits.fetch_add(1, Ordering::Relaxed);
            }
            SnapshotSource::IndexedDb => {
                self.indexed_db_hits.fetch_add(1, Ordering::Relaxed);
            }
            // Api snapshots never come from a tier; emergencies have
            // their own counter.
            SnapshotSource::Api | SnapshotSource::Emergency => {}
        }
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RecoveryMetricsSnapshot {
        RecoveryMetricsSnapshot {
            persist_attempts: self.persist_attempts.load(Ordering::Relaxed),
            persist_tier_failures: self.persist_tier_failures.load(Ordering::Relaxed),
            session_backup_hits: self.session_backup_hits.load(Ordering::Relaxed),
            local_backup_hits: self.local_backup_hits.load(Ordering::Relaxed),
            last_known_hits: self.last_known_hits.load(Ordering::Relaxed),
            indexed_db_hits: self.indexed_db_hits.load(Ordering::Relaxed),
            emergencies_served: self.emergencies_served.load(Ordering::Relaxed),
            tier_read_failures: self.tier_read_failures.load(Ordering::Relaxed),
            invalid_records_purged: self.invalid_records_purged.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of recovery metrics at a point in time.
#[derive(Debug, Clone)]
pub struct RecoveryMetricsSnapshot {
    pub persist_attempts: u64,
    pub persist_tier_failures: u64,
    pub session_backup_hits: u64,
    pub local_backup_hits: u64,
    pub last_known_hits: u64,
    pub indexed_db_hits: u64,
    pub emergencies_served: u64,
    pub tier_read_failures: u64,
    pub invalid_records_purged: u64,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Ordered tier chain with a total recovery contract.
///
/// Recovery priority is the construction order of `tiers`; the
/// emergency defaults are the implicit final step and cannot fail.
pub struct BackupOrchestrator {
    tiers: Vec<Arc<dyn BackupTier>>,
    slots: Arc<SlotStore>,
    defaults: EmergencyDefaults,
    metrics: RecoveryMetrics,
}

impl BackupOrchestrator {
    /// Build an orchestrator over an explicit tier chain.
    ///
    /// `slots` is also held directly for the emergency marker, which is
    /// not itself a tier.
    pub fn new(
        tiers: Vec<Arc<dyn BackupTier>>,
        slots: Arc<SlotStore>,
        defaults: EmergencyDefaults,
    ) -> Self {
        Self {
            tiers,
            slots,
            defaults,
            metrics: RecoveryMetrics::new(),
        }
    }

    /// The standard four-tier chain: session memory, `current` slot,
    /// `last_known` slot, LMDB keyed store.
    pub fn standard(
        slots: Arc<SlotStore>,
        lmdb: Arc<LmdbTier>,
        defaults: EmergencyDefaults,
    ) -> Self {
        let tiers: Vec<Arc<dyn BackupTier>> = vec![
            Arc::new(MemoryTier::new()),
            Arc::new(CurrentSlotTier::new(slots.clone())),
            Arc::new(LastKnownSlotTier::new(slots.clone())),
            lmdb,
        ];
        Self::new(tiers, slots, defaults)
    }

    /// Write `snapshot` through every tier, best-effort per tier.
    ///
    /// A successful sync also resolves any outstanding emergency
    /// marker.
    pub async fn persist(&self, snapshot: &BalanceSnapshot) {
        self.metrics.persist_attempts.fetch_add(1, Ordering::Relaxed);

        for tier in &self.tiers {
            if let Err(e) = tier.put(snapshot).await {
                self.metrics
                    .persist_tier_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    tier = %tier.source(),
                    user_id = %snapshot.user_id,
                    "Tier write failed, skipping"
                );
            }
        }

        if snapshot.status == SyncStatus::Success {
            if let Err(e) = self.slots.clear_emergency_marker().await {
                tracing::warn!(error = %e, "Failed to clear emergency marker");
            }
        }
    }

    /// Recover the best available snapshot for `user_id`.
    ///
    /// Walks the tier chain in priority order. A hit is restamped as
    /// degraded (`status = error`, `error = reason`, `source =` the
    /// originating tier). Owned records with an empty balance table are
    /// purged and skipped; read failures are downgraded to misses. When
    /// every tier misses the emergency defaults are synthesized and the
    /// emergency marker is written.
    pub async fn recover(&self, user_id: UserId, reason: &str) -> BalanceSnapshot {
        for tier in &self.tiers {
            let source = tier.source();
            match tier.get(user_id).await {
                Ok(Some(snapshot)) if snapshot.is_valid_for(user_id) => {
                    self.metrics.record_hit(source);
                    tracing::debug!(
                        user_id = %user_id,
                        tier = %source,
                        "Recovered snapshot from backup tier"
                    );
                    return snapshot.degraded(source, reason);
                }
                Ok(Some(_)) => {
                    // Owned but unusable (empty balance table).
                    self.metrics
                        .invalid_records_purged
                        .fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = tier.purge(user_id).await {
                        tracing::warn!(
                            error = %e,
                            tier = %source,
                            "Failed to purge invalid record"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics
                        .tier_read_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        tier = %source,
                        "Tier read failed, treating as miss"
                    );
                }
            }
        }

        self.metrics
            .emergencies_served
            .fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            user_id = %user_id,
            reason,
            "All backup tiers exhausted, serving emergency defaults"
        );

        if let Err(e) = self.slots.record_emergency(user_id, Utc::now(), reason).await {
            tracing::warn!(error = %e, "Failed to write emergency marker");
        }

        self.defaults.snapshot_for(user_id, reason)
    }

    /// Remove every record belonging to `user_id` across all tiers.
    /// Returns the number of records removed.
    pub async fn purge_user(&self, user_id: UserId) -> u64 {
        let mut purged = 0u64;
        for tier in &self.tiers {
            match tier.purge(user_id).await {
                Ok(count) => purged += count,
                Err(e) => {
                    tracing::warn!(error = %e, tier = %tier.source(), "Tier purge failed");
                }
            }
        }

        match self.slots.last_emergency().await {
            Ok(Some(marker)) if marker.user_id == user_id => {
                if let Err(e) = self.slots.clear_emergency_marker().await {
                    tracing::warn!(error = %e, "Failed to clear emergency marker");
                }
            }
            _ => {}
        }

        purged
    }

    /// Wipe non-durable tiers. Durable tiers keep their records so a
    /// returning user still has a recovery point.
    pub async fn clear_ephemeral(&self) {
        for tier in &self.tiers {
            if tier.is_durable() {
                continue;
            }
            if let Err(e) = tier.clear().await {
                tracing::warn!(
                    error = %e,
                    tier = %tier.source(),
                    "Failed to clear ephemeral tier"
                );
            }
        }
    }

    /// The last emergency marker, if the defaults were ever served.
    pub async fn last_emergency(&self) -> SaldoResult<Option<EmergencyMarker>> {
        self.slots.last_emergency().await
    }

    /// Current counter values.
    pub fn metrics(&self) -> RecoveryMetricsSnapshot {
        self.metrics.snapshot()
    }
}

// ============================================================================
// TESTS
// ============================================================================
