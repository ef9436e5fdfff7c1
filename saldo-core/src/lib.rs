//! Saldo Core - Balance Sync Data Types
//!
//! Shared vocabulary for the balance synchronization layer: snapshots,
//! plans, error taxonomy, amount formatting and emergency defaults.
//! This crate holds data types and pure logic only - storage tiers and
//! the sync engine live in saldo-storage and saldo-sync.

pub mod amount;
pub mod emergency;
pub mod error;
pub mod identity;
pub mod plan;
pub mod snapshot;

pub use emergency::EmergencyDefaults;
pub use error::{ConfigError, FetchError, SaldoError, SaldoResult, StorageError};
pub use identity::{Address, Network, Timestamp, UserId};
pub use plan::Plan;
pub use snapshot::{BalanceSnapshot, SnapshotSource, SyncStatus};
