//! Public facade over the sync layer.
//!
//! [`Balances`] is the one object an application holds: it owns the
//! session state, the controller, the backup orchestrator and the
//! refresh scheduler, and exposes the read surface the UI renders from.
//! Its read methods never fail and never touch the network; loading is
//! explicit (`load_balances`/`reload`) or scheduled.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use saldo_core::{
    amount::{self, format_amount},
    Address, BalanceSnapshot, EmergencyDefaults, Network, Plan, SaldoResult, SnapshotSource,
    SyncStatus, UserId,
};
use saldo_storage::{
    BackupOrchestrator, EmergencyMarker, LmdbTier, RecoveryMetricsSnapshot, SlotStore,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::SyncConfig;
use crate::controller::SyncController;
use crate::scheduler::RefreshScheduler;
use crate::session::{SessionPhase, SessionState};
use crate::source::{BalanceSource, HttpBalanceSource};

/// Coarse sync phase surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Nothing loaded, nothing in flight.
    Idle,
    /// Initial load in flight, nothing to render yet.
    Loading,
    /// A refresh is in flight behind a rendered snapshot.
    Updating,
    /// The rendered snapshot came straight from the API.
    Success,
    /// The rendered snapshot came from a backup tier.
    Error,
    /// The rendered snapshot is the emergency floor.
    Emergency,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Loading => "loading",
            SyncPhase::Updating => "updating",
            SyncPhase::Success => "success",
            SyncPhase::Error => "error",
            SyncPhase::Emergency => "emergency",
        }
    }
}

impl From<SyncStatus> for SyncPhase {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::Success => SyncPhase::Success,
            SyncStatus::Error => SyncPhase::Error,
            SyncStatus::Emergency => SyncPhase::Emergency,
            SyncStatus::Updating => SyncPhase::Updating,
        }
    }
}

/// What the UI should show about sync health right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIndicator {
    pub phase: SyncPhase,
    /// Cause of degradation, absent while everything is healthy.
    pub error: Option<String>,
    /// True when the rendered snapshot did not come from the API.
    pub from_cache: bool,
    /// True while a refresh runs behind a rendered snapshot.
    pub background_update: bool,
}

/// Application-facing balance handle for one signed-in user.
///
/// # Example
///
/// ```ignore
/// let config = SyncConfig::new()
///     .with_base_url("https://api.saldolabs.com")
///     .with_data_dir("/var/lib/saldo");
/// let balances = Balances::open(config, user_id, network, address, Plan::Basic)?;
///
/// let snapshot = balances.load_balances(false).await;
/// println!("cBRL: {}", balances.balance_of("cBRL").await);
/// ```
pub struct Balances {
    controller: Arc<SyncController>,
    orchestrator: Arc<BackupOrchestrator>,
    session: Arc<RwLock<SessionState>>,
    defaults: EmergencyDefaults,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl fmt::Debug for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Balances").finish_non_exhaustive()
    }
}

impl Balances {
    /// Open the full stack for one user and start the refresh schedule.
    ///
    /// Builds the slot store and LMDB tier under `config.data_dir`, the
    /// HTTP source against `config.base_url`, and spawns the periodic
    /// refresh for `plan`. Must be called from within a tokio runtime.
    pub fn open(
        config: SyncConfig,
        user_id: UserId,
        network: Network,
        address: Address,
        plan: Plan,
    ) -> SaldoResult<Self> {
        config.validate()?;

        let defaults = match &config.emergency_defaults_path {
            Some(path) => EmergencyDefaults::from_file(path)?,
            None => EmergencyDefaults::baseline().clone(),
        };

        let orchestrator = standard_orchestrator(
            &config.data_dir,
            config.lmdb_max_size_mb,
            defaults.clone(),
        )?;

        let source = Arc::new(HttpBalanceSource::new(
            &config.base_url,
            config.fetch_timeout,
        )?);
        let session = Arc::new(RwLock::new(SessionState::new(
            user_id, network, address, plan,
        )));
        let controller = Arc::new(SyncController::new(
            source,
            orchestrator.clone(),
            session.clone(),
            config.fetch_timeout,
        ));

        let scheduler = RefreshScheduler::spawn(controller.clone(), plan.refresh_interval());
        tracing::info!(
            user_id = %user_id,
            plan = plan.as_str(),
            data_dir = %config.data_dir.display(),
            "Balance sync opened"
        );

        Ok(Self {
            controller,
            orchestrator,
            session,
            defaults,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// Assemble a facade from pre-built parts.
    ///
    /// No refresh schedule is started; call [`Balances::set_plan`] to
    /// start one. Intended for tests and for embedding a non-HTTP source.
    pub fn with_parts(
        source: Arc<dyn BalanceSource>,
        orchestrator: Arc<BackupOrchestrator>,
        session: Arc<RwLock<SessionState>>,
        defaults: EmergencyDefaults,
        fetch_timeout: Duration,
    ) -> Self {
        let controller = Arc::new(SyncController::new(
            source,
            orchestrator.clone(),
            session.clone(),
            fetch_timeout,
        ));
        Self {
            controller,
            orchestrator,
            session,
            defaults,
            scheduler: Mutex::new(None),
        }
    }

    /// The currently rendered snapshot, if any.
    pub async fn snapshot(&self) -> Option<BalanceSnapshot> {
        self.session.read().await.snapshot().cloned()
    }

    /// Whether a fetch is in flight for the current user.
    pub async fn is_loading(&self) -> bool {
        self.session.read().await.is_loading()
    }

    /// Current point in the session state machine.
    pub async fn phase(&self) -> SessionPhase {
        self.session.read().await.phase()
    }

    /// Sync health indicator for the UI.
    pub async fn sync_status(&self) -> SyncIndicator {
        let session = self.session.read().await;
        let loading = session.is_loading();
        match session.snapshot() {
            Some(snapshot) => SyncIndicator {
                phase: if loading {
                    SyncPhase::Updating
                } else {
                    SyncPhase::from(snapshot.status)
                },
                error: snapshot.error.clone(),
                from_cache: snapshot.source != SnapshotSource::Api,
                background_update: loading,
            },
            None => SyncIndicator {
                phase: if loading {
                    SyncPhase::Loading
                } else {
                    SyncPhase::Idle
                },
                error: None,
                from_cache: false,
                background_update: false,
            },
        }
    }

    /// Load balances, preferring the cache unless `force`.
    pub async fn load_balances(&self, force: bool) -> BalanceSnapshot {
        self.controller.load_balances(force).await
    }

    /// Force a fresh load, bypassing the cache.
    pub async fn reload(&self) -> BalanceSnapshot {
        self.controller.load_balances(true).await
    }

    /// Display amount for one symbol, 6-decimal formatted.
    ///
    /// Never fails and never touches the network: falls back through the
    /// emergency defaults table to a plain zero.
    pub async fn balance_of(&self, symbol: &str) -> String {
        {
            let session = self.session.read().await;
            if let Some(snapshot) = session.snapshot() {
                if let Some(formatted) = snapshot.balance_of(symbol).and_then(format_amount) {
                    return formatted;
                }
            }
        }
        self.defaults
            .balances
            .get(symbol)
            .and_then(|raw| format_amount(raw))
            .unwrap_or_else(|| amount::ZERO.to_string())
    }

    /// Swap the freshness plan and recreate the refresh schedule.
    pub async fn set_plan(&self, plan: Plan) {
        self.session.write().await.plan = plan;

        let mut scheduler = self.scheduler.lock().await;
        if let Some(old) = scheduler.take() {
            old.cancel();
        }
        *scheduler = Some(RefreshScheduler::spawn(
            self.controller.clone(),
            plan.refresh_interval(),
        ));
        tracing::info!(
            plan = plan.as_str(),
            period_secs = plan.refresh_interval().as_secs(),
            "Refresh schedule recreated"
        );
    }

    /// End the session: stop the schedule, purge the user's records from
    /// every tier and reset the state machine to unloaded.
    pub async fn logout(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.cancel();
        }
        let user_id = self.session.read().await.user_id();
        let purged = self.orchestrator.purge_user(user_id).await;
        self.session.write().await.reset();
        tracing::info!(user_id = %user_id, purged, "Logged out and purged backup tiers");
    }

    /// Current refresh period, if a schedule is running.
    pub async fn refresh_period(&self) -> Option<Duration> {
        self.scheduler.lock().await.as_ref().map(|s| s.period())
    }

    /// Counters collected by the backup orchestrator.
    pub fn metrics(&self) -> RecoveryMetricsSnapshot {
        self.orchestrator.metrics()
    }

    /// The most recent emergency marker, if one was ever recorded.
    pub async fn last_emergency(&self) -> SaldoResult<Option<EmergencyMarker>> {
        self.orchestrator.last_emergency().await
    }
}

/// Build the standard orchestrator stack rooted at `data_dir`.
///
/// Shared by [`Balances::open`] and embedders that want the tier chain
/// without the HTTP source.
pub fn standard_orchestrator(
    data_dir: &Path,
    lmdb_max_size_mb: usize,
    defaults: EmergencyDefaults,
) -> SaldoResult<Arc<BackupOrchestrator>> {
    let slots = Arc::new(SlotStore::new(data_dir.join("slots")));
    let lmdb = Arc::new(LmdbTier::new(data_dir.join("lmdb"), lmdb_max_size_mb)?);
    Ok(Arc::new(BackupOrchestrator::standard(
        slots, lmdb, defaults,
    )))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saldo_core::FetchError;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct TestSource {
        response: StdMutex<Result<BTreeMap<String, String>, String>>,
    }

    impl TestSource {
        fn succeeding(pairs: &[(&str, &str)]) -> Self {
            let balances = pairs
                .iter()
                .map(|(symbol, amount)| (symbol.to_string(), amount.to_string()))
                .collect();
            Self {
                response: StdMutex::new(Ok(balances)),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                response: StdMutex::new(Err(reason.to_string())),
            }
        }

        fn set_response(&self, response: Result<BTreeMap<String, String>, String>) {
            *self.response.lock().expect("lock should not be poisoned") = response;
        }
    }

    #[async_trait]
    impl BalanceSource for TestSource {
        async fn fetch(
            &self,
            _network: &Network,
            _address: &Address,
        ) -> Result<BTreeMap<String, String>, FetchError> {
            self.response
                .lock()
                .expect("lock should not be poisoned")
                .clone()
                .map_err(|reason| FetchError::Transport { reason })
        }
    }

    fn facade_for(source: Arc<TestSource>, dir: &TempDir, user_id: UserId, plan: Plan) -> Balances {
        let orchestrator = standard_orchestrator(
            dir.path(),
            10,
            EmergencyDefaults::baseline().clone(),
        )
        .expect("orchestrator should build");
        let session = Arc::new(RwLock::new(SessionState::new(
            user_id,
            Network::from("mainnet"),
            Address::from("0xabc123"),
            plan,
        )));
        Balances::with_parts(
            source,
            orchestrator,
            session,
            EmergencyDefaults::baseline().clone(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_indicator_idle_before_first_load() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "1.000000")]));
        let facade = facade_for(source, &dir, UserId::now_v7(), Plan::Basic);

        let indicator = facade.sync_status().await;
        assert_eq!(indicator.phase, SyncPhase::Idle);
        assert!(indicator.error.is_none());
        assert!(!indicator.from_cache);
        assert!(!indicator.background_update);
        assert_eq!(facade.phase().await, SessionPhase::Unloaded);
        assert!(facade.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_indicator_success_after_load() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "42.000000")]));
        let facade = facade_for(source, &dir, UserId::now_v7(), Plan::Basic);

        facade.load_balances(false).await;

        let indicator = facade.sync_status().await;
        assert_eq!(indicator.phase, SyncPhase::Success);
        assert!(indicator.error.is_none());
        assert!(!indicator.from_cache);
        assert_eq!(facade.phase().await, SessionPhase::Fresh);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_balances() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "77.250000")]));
        let facade = facade_for(source.clone(), &dir, UserId::now_v7(), Plan::Basic);

        facade.load_balances(false).await;
        source.set_response(Err("gateway unreachable".to_string()));
        let snapshot = facade.reload().await;

        assert_eq!(snapshot.status, SyncStatus::Error);
        let indicator = facade.sync_status().await;
        assert_eq!(indicator.phase, SyncPhase::Error);
        assert!(indicator.from_cache);
        let reason = indicator.error.expect("indicator should carry the cause");
        assert!(reason.contains("gateway unreachable"));
        assert_eq!(facade.balance_of("cBRL").await, "77.250000");
    }

    #[tokio::test]
    async fn test_balance_of_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::failing("offline"));
        let facade = facade_for(source, &dir, UserId::now_v7(), Plan::Basic);

        // Nothing loaded at all: the defaults table answers.
        assert_eq!(facade.balance_of("cBRL").await, "0.000000");
        assert_eq!(facade.balance_of("USDT").await, "0.000000");
        // Symbol absent everywhere: plain zero.
        assert_eq!(facade.balance_of("DOGE").await, "0.000000");
    }

    #[tokio::test]
    async fn test_balance_of_formats_snapshot_amount() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "125.5"), ("USDT", "3")]));
        let facade = facade_for(source, &dir, UserId::now_v7(), Plan::Basic);

        facade.load_balances(false).await;

        assert_eq!(facade.balance_of("cBRL").await, "125.500000");
        assert_eq!(facade.balance_of("USDT").await, "3.000000");
    }

    #[tokio::test]
    async fn test_set_plan_recreates_schedule() {
        let dir = TempDir::new().expect("tempdir should be created");
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "1.000000")]));
        let facade = facade_for(source, &dir, UserId::now_v7(), Plan::Basic);

        assert_eq!(facade.refresh_period().await, None);

        facade.set_plan(Plan::Basic).await;
        assert_eq!(facade.refresh_period().await, Some(Duration::from_secs(300)));

        facade.set_plan(Plan::Premium).await;
        assert_eq!(facade.refresh_period().await, Some(Duration::from_secs(60)));
        assert_eq!(facade.session.read().await.plan(), Plan::Premium);
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_tiers() {
        let dir = TempDir::new().expect("tempdir should be created");
        let user_id = UserId::now_v7();
        let source = Arc::new(TestSource::succeeding(&[("cBRL", "9.000000")]));
        let facade = facade_for(source, &dir, user_id, Plan::Basic);

        facade.load_balances(false).await;
        facade.set_plan(Plan::Basic).await;
        facade.logout().await;

        assert!(facade.snapshot().await.is_none());
        assert_eq!(facade.phase().await, SessionPhase::Unloaded);
        assert_eq!(facade.refresh_period().await, None);

        // Every tier was purged: recovery can only synthesize defaults.
        let recovered = facade.orchestrator.recover(user_id, "post-logout probe").await;
        assert!(recovered.is_emergency);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let err = Balances::open(
            SyncConfig::new().with_base_url(""),
            UserId::now_v7(),
            Network::from("mainnet"),
            Address::from("0xabc123"),
            Plan::Basic,
        )
        .expect_err("open should reject an empty base url");
        assert!(matches!(err, saldo_core::SaldoError::Config(_)));
    }

    #[tokio::test]
    async fn test_open_starts_schedule_for_plan() {
        let dir = TempDir::new().expect("tempdir should be created");
        let config = SyncConfig::new()
            .with_base_url("http://127.0.0.1:1")
            .with_data_dir(dir.path());
        let facade = Balances::open(
            config,
            UserId::now_v7(),
            Network::from("mainnet"),
            Address::from("0xabc123"),
            Plan::Pro,
        )
        .expect("open should succeed");

        assert_eq!(facade.refresh_period().await, Some(Duration::from_secs(120)));
        facade.logout().await;
    }
}
