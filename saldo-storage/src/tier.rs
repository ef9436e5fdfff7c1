//! Backup tier capability trait.
//!
//! Every storage layer that can hold a balance snapshot - in-process
//! memory, slot files on disk, the LMDB store - implements [`BackupTier`].
//! The orchestrator only ever talks to the trait, so the fallback chain
//! is an ordered list of tiers and adding or removing one is a one-line
//! change at construction.

use async_trait::async_trait;
use saldo_core::{BalanceSnapshot, SaldoResult, SnapshotSource, UserId};

/// One layer of the backup chain.
///
/// # Ownership contract
///
/// `get` must only ever return a snapshot owned by the requested user.
/// A tier that finds a record belonging to someone else purges it and
/// reports a miss; stale foreign data must not survive a read. Validity
/// beyond ownership (non-empty balance table) is the orchestrator's
/// concern.
///
/// # Failure contract
///
/// Tier errors are recoverable by definition: the orchestrator logs them
/// and moves on. Implementations return `Err` rather than panicking so
/// the chain can degrade gracefully.
#[async_trait]
pub trait BackupTier: Send + Sync {
    /// Provenance tag this tier stamps onto recovered snapshots.
    fn source(&self) -> SnapshotSource;

    /// Whether records survive a process restart.
    fn is_durable(&self) -> bool;

    /// Store a snapshot, replacing whatever the tier held for its owner.
    async fn put(&self, snapshot: &BalanceSnapshot) -> SaldoResult<()>;

    /// Fetch the snapshot owned by `user_id`, if any.
    async fn get(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>>;

    /// Remove all records owned by `user_id`. Returns how many went away.
    async fn purge(&self, user_id: UserId) -> SaldoResult<u64>;

    /// Wipe the tier completely, regardless of owner.
    async fn clear(&self) -> SaldoResult<()>;
}
