//! Subscription plans and the freshness policy they buy.
//!
//! Higher plans pay for tighter balance freshness: the plan decides both
//! how long a cached snapshot stays valid and how often the background
//! refresh fires. The two are the same number on purpose - a snapshot
//! should be replaced right as it goes stale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Subscription tier of the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Premium,
    Pro,
    #[default]
    Basic,
}

impl Plan {
    /// How long a snapshot fetched under this plan stays fresh.
    pub fn cache_ttl(&self) -> Duration {
        match self {
            Plan::Premium => Duration::from_secs(60),
            Plan::Pro => Duration::from_secs(2 * 60),
            Plan::Basic => Duration::from_secs(5 * 60),
        }
    }

    /// Background refresh period; equals the cache TTL.
    pub fn refresh_interval(&self) -> Duration {
        self.cache_ttl()
    }

    /// The serialized tag, also used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Premium => "premium",
            Plan::Pro => "pro",
            Plan::Basic => "basic",
        }
    }

    /// Lenient mapping from a wire plan name. Unknown or missing plans
    /// fall back to `Basic`, the most conservative freshness policy.
    pub fn from_name(name: Option<&str>) -> Plan {
        match name {
            Some(raw) => raw.parse().unwrap_or(Plan::Basic),
            None => Plan::Basic,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "premium" => Ok(Plan::Premium),
            "pro" => Ok(Plan::Pro),
            "basic" => Ok(Plan::Basic),
            _ => Err(format!("Invalid Plan: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_table() {
        assert_eq!(Plan::Premium.cache_ttl(), Duration::from_secs(60));
        assert_eq!(Plan::Pro.cache_ttl(), Duration::from_secs(120));
        assert_eq!(Plan::Basic.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_refresh_interval_matches_ttl() {
        for plan in [Plan::Premium, Plan::Pro, Plan::Basic] {
            assert_eq!(plan.refresh_interval(), plan.cache_ttl());
        }
    }

    #[test]
    fn test_default_is_basic() {
        assert_eq!(Plan::default(), Plan::Basic);
    }

    #[test]
    fn test_from_name_falls_back_to_basic() {
        assert_eq!(Plan::from_name(Some("premium")), Plan::Premium);
        assert_eq!(Plan::from_name(Some("PRO")), Plan::Pro);
        assert_eq!(Plan::from_name(Some("enterprise")), Plan::Basic);
        assert_eq!(Plan::from_name(None), Plan::Basic);
    }

    #[test]
    fn test_display_parse_roundtrip() {
        for plan in [Plan::Premium, Plan::Pro, Plan::Basic] {
            let parsed: Plan = plan.to_string().parse().expect("parse should succeed");
            assert_eq!(parsed, plan);
        }
        assert!("gold".parse::<Plan>().is_err());
    }
}
