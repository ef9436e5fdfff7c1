//! User-scoped key layout for the LMDB tier.
//!
//! The important property is that a `UserScopedKey` cannot be built
//! without a user id, so every LMDB read and write is user-isolated by
//! construction - a lookup for user A is structurally unable to land on
//! user B's record.

use saldo_core::UserId;
use uuid::Uuid;

/// Separator byte between the user id and the record kind.
const SEPARATOR: u8 = 0xFF;

/// Kind of record stored under a user's key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// The user's persisted balance snapshot (JSON value).
    Snapshot,
    /// The snapshot's write instant (8-byte little-endian millis),
    /// kept as its own record so pruning never has to deserialize
    /// snapshot bodies.
    Stamp,
}

/// A store key scoped to one user.
///
/// # Binary Format
///
/// The key encodes to a fixed 18-byte array:
/// - Bytes 0-15: user_id (UUID as bytes)
/// - Byte 16: separator (0xFF)
/// - Byte 17: record kind (single byte discriminant)
///
/// Keys sort by user first, so a prefix scan over bytes 0-16 visits
/// exactly one user's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserScopedKey {
    user_id: UserId,
    kind: RecordKind,
}

impl UserScopedKey {
    /// Create a key for one of a user's records.
    pub fn new(user_id: UserId, kind: RecordKind) -> Self {
        Self { user_id, kind }
    }

    /// The user this key is scoped to.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The record kind this key addresses.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Encode to the fixed 18-byte LMDB key.
    pub fn encode(&self) -> [u8; 18] {
        let mut bytes = [0u8; 18];
        bytes[0..16].copy_from_slice(self.user_id.as_uuid().as_bytes());
        bytes[16] = SEPARATOR;
        bytes[17] = kind_to_byte(self.kind);
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` when the slice is not exactly 18 bytes, the
    /// separator is wrong, or the kind byte is unknown.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 18 {
            return None;
        }
        if bytes[16] != SEPARATOR {
            return None;
        }
        let user_id = Uuid::from_slice(&bytes[0..16]).ok()?;
        let kind = byte_to_kind(bytes[17])?;
        Some(Self {
            user_id: UserId::new(user_id),
            kind,
        })
    }

    /// Prefix matching every record kind for one user.
    ///
    /// Used with range scans to purge a user's data in one pass.
    pub fn user_prefix(user_id: UserId) -> [u8; 17] {
        let mut prefix = [0u8; 17];
        prefix[0..16].copy_from_slice(user_id.as_uuid().as_bytes());
        prefix[16] = SEPARATOR;
        prefix
    }
}

fn kind_to_byte(kind: RecordKind) -> u8 {
    match kind {
        RecordKind::Snapshot => 0,
        RecordKind::Stamp => 1,
    }
}

fn byte_to_kind(byte: u8) -> Option<RecordKind> {
    match byte {
        0 => Some(RecordKind::Snapshot),
        1 => Some(RecordKind::Stamp),
        _ => None,
    }
}
