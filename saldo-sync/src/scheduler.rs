//! Periodic balance refresh task.
//!
//! The scheduler owns one background task that calls
//! `SyncController::load_balances(false)` on a fixed period. Refreshes
//! are non-forced, so a still-valid cache suppresses the network fetch
//! and a tick costs nothing. The period comes from the session plan;
//! a plan change replaces the whole scheduler rather than adjusting a
//! live one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::controller::SyncController;

/// Handle to the background refresh task.
///
/// Cancelled explicitly via [`RefreshScheduler::cancel`] or implicitly on
/// drop. The first refresh fires immediately on spawn; subsequent ones
/// run every `period`.
pub struct RefreshScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    period: Duration,
}

impl RefreshScheduler {
    /// Spawn the refresh task on the current runtime.
    pub fn spawn(controller: Arc<SyncController>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(refresh_task(controller, period, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
            period,
        }
    }

    /// The period this scheduler refreshes at.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the task to stop. Idempotent.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Background task that refreshes balances until shutdown is signalled.
async fn refresh_task(
    controller: Arc<SyncController>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(period_secs = period.as_secs(), "Balance refresh task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Balance refresh task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let snapshot = controller.load_balances(false).await;
                tracing::trace!(
                    status = %snapshot.status,
                    source = %snapshot.source,
                    "Background refresh tick"
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
