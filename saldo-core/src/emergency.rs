//! Emergency default balances - the floor of the recovery chain.
//!
//! When the fetch fails and every backup tier misses, the app still
//! needs something to render. Emergency defaults supply a zeroed
//! balance table for the product's known tokens, clearly stamped so no
//! caller can mistake it for real data.
//!
//! The table is configuration, not code: deployments override it with
//! a TOML file, and a compiled-in baseline backs everything else.

use crate::amount::{self, format_amount};
use crate::{
    Address, BalanceSnapshot, ConfigError, Network, SnapshotSource, SyncStatus, UserId,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Compiled-in baseline used when no override file is configured.
static BASELINE: Lazy<EmergencyDefaults> = Lazy::new(EmergencyDefaults::default);

/// Emergency balance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDefaults {
    /// Network tag stamped onto emergency snapshots.
    pub network: Network,
    /// Placeholder address stamped onto emergency snapshots.
    pub address: Address,
    /// Symbol to amount. Amounts are genuine zeros so nothing downstream
    /// can read an emergency snapshot as spendable funds.
    pub balances: BTreeMap<String, String>,
}

impl Default for EmergencyDefaults {
    fn default() -> Self {
        let mut balances = BTreeMap::new();
        balances.insert("cBRL".to_string(), amount::ZERO.to_string());
        balances.insert("USDT".to_string(), amount::ZERO.to_string());
        Self {
            network: Network::from("mainnet"),
            address: Address::from("0x0000000000000000000000000000000000000000"),
            balances,
        }
    }
}

impl EmergencyDefaults {
    /// The compiled-in baseline.
    pub fn baseline() -> &'static EmergencyDefaults {
        &BASELINE
    }

    /// Load an override table from a TOML file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let defaults: EmergencyDefaults =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - balances has at least one symbol
    /// - every amount is a plain decimal string
    /// - network and address are non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.balances.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "balances".to_string(),
            });
        }
        for (symbol, raw) in &self.balances {
            if format_amount(raw).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: format!("balances.{}", symbol),
                    value: raw.clone(),
                    reason: "must be a decimal amount".to_string(),
                });
            }
        }
        if self.network.as_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "network".to_string(),
            });
        }
        if self.address.as_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "address".to_string(),
            });
        }
        Ok(())
    }

    /// Build the emergency snapshot for a user. Cannot fail.
    ///
    /// Amounts are re-normalized to display scale here, so even a
    /// hand-built table yields canonical output. The snapshot is valid
    /// by construction: it belongs to `user_id` and is never empty.
    pub fn snapshot_for(&self, user_id: UserId, reason: impl Into<String>) -> BalanceSnapshot {
        let mut balances: BTreeMap<String, String> = self
            .balances
            .iter()
            .map(|(symbol, raw)| {
                let normalized =
                    format_amount(raw).unwrap_or_else(|| amount::ZERO.to_string());
                (symbol.clone(), normalized)
            })
            .collect();
        if balances.is_empty() {
            balances.insert("cBRL".to_string(), amount::ZERO.to_string());
        }
        BalanceSnapshot {
            user_id,
            network: self.network.clone(),
            address: self.address.clone(),
            balances,
            loaded_at: Utc::now(),
            status: SyncStatus::Emergency,
            error: Some(reason.into()),
            source: SnapshotSource::Emergency,
            is_emergency: true,
        }
    }
}
