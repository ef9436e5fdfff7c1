//! Session state: the one mutable container for the active user.
//!
//! Constructor-injected, no ambient globals. The controller mutates it
//! under a lock and the facade reads it. The rendering phase is always
//! derived from the stored snapshot and loading flag, never stored
//! itself, so it cannot drift.

use saldo_core::{Address, BalanceSnapshot, Network, Plan, SyncStatus, UserId};

/// Derived rendering phase for the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No snapshot and nothing in flight.
    Unloaded,
    /// Initial fetch in flight, nothing to render yet.
    Loading,
    /// A refresh is in flight; the previous snapshot stays rendered.
    Updating,
    /// Snapshot fetched from the API and still within its TTL.
    Fresh,
    /// Snapshot past its TTL; rendered rather than blanked.
    Stale,
    /// Snapshot recovered from a backup tier after a failed fetch.
    Degraded,
    /// Snapshot synthesized from the emergency defaults.
    Emergency,
}

/// Mutable state for one user session.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) user_id: UserId,
    pub(crate) network: Network,
    pub(crate) address: Address,
    pub(crate) plan: Plan,
    pub(crate) snapshot: Option<BalanceSnapshot>,
    pub(crate) loading: bool,
}

impl SessionState {
    /// A fresh session with no snapshot.
    pub fn new(user_id: UserId, network: Network, address: Address, plan: Plan) -> Self {
        Self {
            user_id,
            network,
            address,
            plan,
            snapshot: None,
            loading: false,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn plan(&self) -> Plan {
        self.plan
    }

    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Cache validity: snapshot present, owned by the active user, and
    /// younger than the plan's TTL. Never stale-true after a user
    /// switch.
    pub fn is_cache_valid(&self) -> bool {
        self.snapshot
            .as_ref()
            .map(|s| s.user_id == self.user_id && s.age() < self.plan.cache_ttl())
            .unwrap_or(false)
    }

    /// The derived session phase.
    pub fn phase(&self) -> SessionPhase {
        match (&self.snapshot, self.loading) {
            (None, false) => SessionPhase::Unloaded,
            (None, true) => SessionPhase::Loading,
            (Some(_), true) => SessionPhase::Updating,
            (Some(s), false) => {
                if s.is_emergency {
                    SessionPhase::Emergency
                } else if s.status == SyncStatus::Error {
                    SessionPhase::Degraded
                } else if self.is_cache_valid() {
                    SessionPhase::Fresh
                } else {
                    SessionPhase::Stale
                }
            }
        }
    }

    /// Logout reset: drop the snapshot and any in-flight marker.
    pub(crate) fn reset(&mut self) {
        self.snapshot = None;
        self.loading = false;
    }
}
