//! Saldo Sync - Resilient Balance Loading
//!
//! The sync layer keeps a user's token balances rendered through network
//! failures. A successful fetch is copied across the backup tiers in
//! saldo-storage; a failed one is answered from them, degrading in a
//! fixed order and bottoming out at the emergency defaults. Loading is
//! single-flight per user and refreshed on a plan-derived period.
//!
//! Applications interact through [`Balances`]; the remaining modules are
//! exposed for embedders that assemble their own stack.

pub mod config;
pub mod controller;
pub mod facade;
pub mod scheduler;
pub mod session;
pub mod source;

pub use config::SyncConfig;
pub use controller::SyncController;
pub use facade::{standard_orchestrator, Balances, SyncIndicator, SyncPhase};
pub use scheduler::RefreshScheduler;
pub use session::{SessionPhase, SessionState};
pub use source::{BalanceSource, FetchEnvelope, FetchPayload, HttpBalanceSource};
