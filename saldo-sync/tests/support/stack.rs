use saldo_core::{Address, EmergencyDefaults, Network, Plan, UserId};
use saldo_storage::{BackupOrchestrator, LmdbTier, SlotStore};
use saldo_sync::{BalanceSource, Balances, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

/// Full standard tier chain over a tempdir, with handles to the
/// individual backends so tests can void tiers one by one.
pub struct TierStack {
    pub slots: Arc<SlotStore>,
    pub lmdb: Arc<LmdbTier>,
    pub orchestrator: Arc<BackupOrchestrator>,
}

pub fn tier_stack(dir: &TempDir) -> TierStack {
    let slots = Arc::new(SlotStore::new(dir.path().join("slots")));
    let lmdb = Arc::new(
        LmdbTier::new(dir.path().join("lmdb"), 10).expect("lmdb open should succeed"),
    );
    let orchestrator = Arc::new(BackupOrchestrator::standard(
        slots.clone(),
        lmdb.clone(),
        EmergencyDefaults::baseline().clone(),
    ));
    TierStack {
        slots,
        lmdb,
        orchestrator,
    }
}

pub fn session_for(user_id: UserId, plan: Plan) -> Arc<RwLock<SessionState>> {
    Arc::new(RwLock::new(SessionState::new(
        user_id,
        Network::from("mainnet"),
        Address::from("0xabc123"),
        plan,
    )))
}

pub fn facade_with(
    source: Arc<dyn BalanceSource>,
    orchestrator: Arc<BackupOrchestrator>,
    user_id: UserId,
    plan: Plan,
) -> Balances {
    Balances::with_parts(
        source,
        orchestrator,
        session_for(user_id, plan),
        EmergencyDefaults::baseline().clone(),
        Duration::from_secs(2),
    )
}
