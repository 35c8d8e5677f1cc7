use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, PoolId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown portfolio {value:?}: expected \"core\" or \"growth\"")]
pub struct ParsePortfolioError {
    value: String,
}

/// The two reporting portfolios. Every tracked pool belongs to at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioName {
    Core,
    Growth,
}

impl PortfolioName {
    pub const ALL: [PortfolioName; 2] = [PortfolioName::Core, PortfolioName::Growth];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioName::Core => "core",
            PortfolioName::Growth => "growth",
        }
    }
}

impl fmt::Display for PortfolioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortfolioName {
    type Err = ParsePortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "core" => Ok(PortfolioName::Core),
            "growth" => Ok(PortfolioName::Growth),
            _ => Err(ParsePortfolioError {
                value: s.to_string(),
            }),
        }
    }
}

/// One pool's slice of a snapshot.
///
/// `value_usd` is `None` when the pool could not be priced and the run's
/// policy recorded it as an explicit gap; the pool's value is then excluded
/// from the snapshot total rather than counted as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolContribution {
    pub pool_id: PoolId,
    pub label: String,
    /// Decimal string; full precision, rounding happens at display time only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<String>,
    /// Fraction of the pool's share supply owned across all accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_ratio: Option<String>,
}

/// A point-in-time USD valuation of one portfolio across all accounts.
/// One line in the portfolio's JSONL history file. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub portfolio: PortfolioName,
    #[serde(default)]
    pub accounts: Vec<AccountId>,
    /// Decimal string to avoid floating point drift across runs.
    pub total_usd: String,
    /// Per-pool breakdown in the portfolio's configured order.
    pub pools: Vec<PoolContribution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_name_parsing() {
        assert_eq!(" Core ".parse::<PortfolioName>().unwrap(), PortfolioName::Core);
        assert_eq!("GROWTH".parse::<PortfolioName>().unwrap(), PortfolioName::Growth);
        assert!("usd".parse::<PortfolioName>().is_err());
    }

    #[test]
    fn test_missing_contribution_roundtrip() {
        let contribution = PoolContribution {
            pool_id: PoolId::from("1.19.1"),
            label: "USDT/USDC".to_string(),
            value_usd: None,
            share_ratio: None,
        };
        let json = serde_json::to_string(&contribution).unwrap();
        assert_eq!(json, r#"{"pool_id":"1.19.1","label":"USDT/USDC"}"#);
        let back: PoolContribution = serde_json::from_str(&json).unwrap();
        assert!(back.value_usd.is_none());
    }
}
