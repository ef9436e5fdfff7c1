//! Ephemeral in-process tier.
//!
//! Holds exactly one snapshot - the active session's - and dies with the
//! process. First stop in the recovery chain because it is the cheapest
//! and the most likely to be fresh.

use async_trait::async_trait;
use saldo_core::{BalanceSnapshot, SaldoResult, SnapshotSource, UserId};
use tokio::sync::RwLock;

use crate::tier::BackupTier;

/// Single-record memory tier (`session_backup`).
#[derive(Debug, Default)]
pub struct MemoryTier {
    slot: RwLock<Option<BalanceSnapshot>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackupTier for MemoryTier {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::SessionBackup
    }

    fn is_durable(&self) -> bool {
        false
    }

    async fn put(&self, snapshot: &BalanceSnapshot) -> SaldoResult<()> {
        *self.slot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> SaldoResult<Option<BalanceSnapshot>> {
        {
            let slot = self.slot.read().await;
            match slot.as_ref() {
                Some(held) if held.user_id == user_id => return Ok(Some(held.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        // Foreign record: take the write lock and evict it. Re-check the
        // owner first, a concurrent put may have replaced the record
        // between the two lock acquisitions.
        let mut slot = self.slot.write().await;
        match slot.as_ref() {
            Some(held) if held.user_id == user_id => Ok(Some(held.clone())),
            Some(held) => {
                tracing::warn!(
                    requested = %user_id,
                    owner = %held.user_id,
                    "evicting foreign snapshot from session tier"
                );
                *slot = None;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn purge(&self, user_id: UserId) -> SaldoResult<u64> {
        let mut slot = self.slot.write().await;
        match slot.as_ref() {
            Some(held) if held.user_id == user_id => {
                *slot = None;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn clear(&self) -> SaldoResult<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}
