//! Saldo Storage - Tiered Backup for Balance Snapshots
//!
//! Defines the `BackupTier` capability trait, its backends (in-process
//! memory, atomic slot files, LMDB keyed store) and the orchestrator
//! that chains them into a total recovery path. Every read is scoped to
//! a user; foreign records are evicted rather than served.

pub mod lmdb;
pub mod memory;
pub mod orchestrator;
pub mod slots;
pub mod tier;
pub mod user_key;

pub use lmdb::{LmdbTier, LmdbTierError};
pub use memory::MemoryTier;
pub use tier::BackupTier;
pub use user_key::{RecordKind, UserScopedKey};

// Re-export slot types for facade wiring
pub use slots::{
    CurrentSlotTier, EmergencyMarker, LastKnownSlotTier, SlotStore, CURRENT_SLOT,
    EMERGENCY_MARKER, LAST_KNOWN_SLOT,
};

// Re-export orchestrator types for the sync layer
pub use orchestrator::{BackupOrchestrator, RecoveryMetrics, RecoveryMetricsSnapshot};
