//! Sync controller - single-flight balance loading.
//!
//! `load_balances` is the one entry point that talks to the network. It
//! never fails: a successful fetch is persisted across the backup tiers,
//! and any fetch failure is answered from them instead. Concurrent calls
//! for the same user coalesce onto one in-flight fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use saldo_core::{BalanceSnapshot, FetchError, UserId};
use saldo_storage::BackupOrchestrator;
use tokio::sync::{Mutex, RwLock};

use crate::session::SessionState;
use crate::source::BalanceSource;

/// Drives balance loading for one session.
pub struct SyncController {
    source: Arc<dyn BalanceSource>,
    orchestrator: Arc<BackupOrchestrator>,
    session: Arc<RwLock<SessionState>>,
    /// Per-user coalescing locks. Held only for the duration of one fetch.
    flights: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    fetch_timeout: Duration,
}

impl SyncController {
    pub fn new(
        source: Arc<dyn BalanceSource>,
        orchestrator: Arc<BackupOrchestrator>,
        session: Arc<RwLock<SessionState>>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            orchestrator,
            session,
            flights: Mutex::new(HashMap::new()),
            fetch_timeout,
        }
    }

    /// Whether the session cache can answer a load without a fetch.
    pub async fn is_cache_valid(&self) -> bool {
        self.session.read().await.is_cache_valid()
    }

    /// Load balances for the session user.
    ///
    /// Returns the freshest snapshot obtainable, in order of preference:
    /// the in-session cache (unless `force` or expired), a live fetch, the
    /// backup tiers, and finally the emergency defaults. Never fails.
    pub async fn load_balances(&self, force: bool) -> BalanceSnapshot {
        let (user_id, network, address) = {
            let session = self.session.read().await;
            if !force && session.is_cache_valid() {
                if let Some(snapshot) = session.snapshot() {
                    return snapshot.clone();
                }
            }
            (
                session.user_id(),
                session.network().clone(),
                session.address().clone(),
            )
        };

        let flight = {
            let mut flights = self.flights.lock().await;
            flights.entry(user_id).or_default().clone()
        };
        let _guard = flight.lock().await;

        // A coalesced caller may have refreshed the cache while this call
        // waited its turn on the flight lock.
        if !force {
            let session = self.session.read().await;
            if session.is_cache_valid() {
                if let Some(snapshot) = session.snapshot() {
                    return snapshot.clone();
                }
            }
        }

        self.session.write().await.loading = true;

        let fetch = self.source.fetch(&network, &address);
        let outcome = tokio::time::timeout(self.fetch_timeout, fetch).await;
        let snapshot = match outcome {
            Ok(Ok(balances)) => {
                let snapshot = BalanceSnapshot::from_api(user_id, network, address, balances);
                self.orchestrator.persist(&snapshot).await;
                snapshot
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, user_id = %user_id, "Balance fetch failed, serving from backups");
                self.orchestrator.recover(user_id, &e.to_string()).await
            }
            Err(_) => {
                let e = FetchError::Timeout {
                    elapsed_ms: self.fetch_timeout.as_millis() as u64,
                };
                tracing::warn!(error = %e, user_id = %user_id, "Balance fetch timed out, serving from backups");
                self.orchestrator.recover(user_id, &e.to_string()).await
            }
        };

        {
            let mut session = self.session.write().await;
            session.snapshot = Some(snapshot.clone());
            session.loading = false;
        }
        snapshot
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::{
        Address, EmergencyDefaults, Network, Plan, SnapshotSource, SyncStatus,
    };
    use saldo_storage::{LmdbTier, SlotStore};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Test source that replays a configured response after an optional delay.
    struct ScriptedSource {
        response: StdMutex<Result<BTreeMap<String, String>, String>>,
        delay: Duration,
        calls: AtomicU64,
    }

    impl ScriptedSource {
        fn succeeding(balances: BTreeMap<String, String>) -> Self {
            Self {
                response: StdMutex::new(Ok(balances)),
                delay: Duration::ZERO,
                calls: AtomicU64::new(0),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                response: StdMutex::new(Err(reason.to_string())),
                delay: Duration::ZERO,
                calls: AtomicU64::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn set_response(&self, response: Result<BTreeMap<String, String>, String>) {
            *self.response.lock().expect("lock should not be poisoned") = response;
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BalanceSource for ScriptedSource {
        async fn fetch(
            &self,
            _network: &Network,
            _address: &Address,
        ) -> Result<BTreeMap<String, String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let response = self
                .response
                .lock()
                .expect("lock should not be poisoned")
                .clone();
            response.map_err(|reason| FetchError::Transport { reason })
        }
    }

    fn balances(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(symbol, amount)| (symbol.to_string(), amount.to_string()))
            .collect()
    }

    fn backed_orchestrator(dir: &TempDir) -> Arc<BackupOrchestrator> {
        let slots = Arc::new(SlotStore::new(dir.path().join("slots")));
        let lmdb = Arc::new(
            LmdbTier::new(dir.path().join("lmdb"), 10).expect("lmdb open should succeed"),
        );
        Arc::new(BackupOrchestrator::standard(
            slots,
            lmdb,
            EmergencyDefaults::baseline().clone(),
        ))
    }

    fn controller_for(
        source: Arc<ScriptedSource>,
        dir: &TempDir,
        user_id: UserId,
    ) -> Arc<SyncController> {
        let session = Arc::new(RwLock::new(SessionState::new(
            user_id,
            Network::from("mainnet"),
            Address::from("0xabc123"),
            Plan::Basic,
        )));
        Arc::new(SyncController::new(
            source,
            backed_orchestrator(dir),
            session,
            Duration::from_secs(2),
        ))
    }

    #[tokio::test]
    async fn test_successful_fetch_returns_fresh_snapshot() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(ScriptedSource::succeeding(balances(&[
            ("cBRL", "125.500000"),
            ("USDT", "10.000000"),
        ])));
        let controller = controller_for(source.clone(), &dir, user_id);

        let snapshot = controller.load_balances(false).await;

        assert_eq!(snapshot.user_id, user_id);
        assert_eq!(snapshot.status, SyncStatus::Success);
        assert_eq!(snapshot.source, SnapshotSource::Api);
        assert_eq!(snapshot.balance_of("cBRL"), Some("125.500000"));
        assert_eq!(source.calls(), 1);

        let session = controller.session.read().await;
        assert_eq!(session.snapshot(), Some(&snapshot));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_valid_cache_skips_fetch() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(ScriptedSource::succeeding(balances(&[("cBRL", "1.000000")])));
        let controller = controller_for(source.clone(), &dir, user_id);

        let first = controller.load_balances(false).await;
        let second = controller.load_balances(false).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(ScriptedSource::succeeding(balances(&[("cBRL", "1.000000")])));
        let controller = controller_for(source.clone(), &dir, user_id);

        controller.load_balances(false).await;
        controller.load_balances(true).await;

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_newest_backup() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(ScriptedSource::succeeding(balances(&[(
            "cBRL",
            "77.250000",
        )])));
        let controller = controller_for(source.clone(), &dir, user_id);

        controller.load_balances(false).await;
        source.set_response(Err("connection refused".to_string()));

        let snapshot = controller.load_balances(true).await;

        assert_eq!(snapshot.status, SyncStatus::Error);
        assert_eq!(snapshot.source, SnapshotSource::SessionBackup);
        assert_eq!(snapshot.balance_of("cBRL"), Some("77.250000"));
        let reason = snapshot.error.expect("degraded snapshot should carry a reason");
        assert!(reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_offline_fresh_start_serves_emergency() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(ScriptedSource::failing("dns lookup failed"));
        let controller = controller_for(source.clone(), &dir, user_id);

        let snapshot = controller.load_balances(false).await;

        assert!(snapshot.is_emergency);
        assert_eq!(snapshot.status, SyncStatus::Emergency);
        assert_eq!(snapshot.user_id, user_id);
        assert!(snapshot.has_balances());

        let marker = controller
            .orchestrator
            .last_emergency()
            .await
            .expect("marker read should succeed")
            .expect("marker should be recorded");
        assert_eq!(marker.user_id, user_id);
        assert!(marker.reason.contains("dns lookup failed"));
    }

    #[tokio::test]
    async fn test_timeout_recovers_with_timeout_reason() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(
            ScriptedSource::succeeding(balances(&[("cBRL", "1.000000")]))
                .with_delay(Duration::from_millis(500)),
        );
        let session = Arc::new(RwLock::new(SessionState::new(
            user_id,
            Network::from("mainnet"),
            Address::from("0xabc123"),
            Plan::Basic,
        )));
        let controller = SyncController::new(
            source.clone(),
            backed_orchestrator(&dir),
            session,
            Duration::from_millis(50),
        );

        let snapshot = controller.load_balances(false).await;

        assert_eq!(snapshot.status, SyncStatus::Emergency);
        let reason = snapshot.error.expect("timeout snapshot should carry a reason");
        assert!(reason.contains("timed out"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_coalesce_on_success() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(
            ScriptedSource::succeeding(balances(&[("cBRL", "5.000000")]))
                .with_delay(Duration::from_millis(50)),
        );
        let controller = controller_for(source.clone(), &dir, user_id);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let controller = controller.clone();
            handles.push(tokio::spawn(
                async move { controller.load_balances(false).await },
            ));
        }
        let mut snapshots = Vec::new();
        for handle in handles {
            snapshots.push(handle.await.expect("task should not panic"));
        }

        assert_eq!(source.calls(), 1);
        for snapshot in &snapshots {
            assert_eq!(snapshot, &snapshots[0]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_coalesce_when_offline() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(
            ScriptedSource::failing("network unreachable").with_delay(Duration::from_millis(50)),
        );
        let controller = controller_for(source.clone(), &dir, user_id);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let controller = controller.clone();
            handles.push(tokio::spawn(
                async move { controller.load_balances(false).await },
            ));
        }
        let mut snapshots = Vec::new();
        for handle in handles {
            snapshots.push(handle.await.expect("task should not panic"));
        }

        // The winner synthesizes the emergency snapshot and caches it; every
        // coalesced caller is answered from that cache.
        assert_eq!(source.calls(), 1);
        for snapshot in &snapshots {
            assert!(snapshot.is_emergency);
            assert_eq!(snapshot.user_id, user_id);
        }
    }
}
