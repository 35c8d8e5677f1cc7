use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Asset;

/// Chain object id of a liquidity pool (e.g. "1.19.327").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PoolId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PoolId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Closed set of pricing rules. Selection is keyed off this declared tag,
/// not off symbol matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationStrategy {
    /// Both sides are stablecoins; the pool is worth the sum of its reserves.
    StableDouble,
    /// One side is the reference asset; the pool is worth twice the reference
    /// side at the reference asset's market price.
    CrossReference,
}

/// Static description of a tracked pool. Live reserves and share supply are
/// refreshed each run from the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: PoolId,
    pub label: String,
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub strategy: ValuationStrategy,
    /// Marks a pool whose reserves define the reference asset's USD price.
    #[serde(default)]
    pub price_reference: bool,
    /// Excluded from every portfolio breakdown, but still usable as a price
    /// reference.
    #[serde(default)]
    pub skip_valuation: bool,
}

impl PoolConfig {
    /// Returns the side of the pool holding `symbol`, as (matching, other).
    pub fn side(&self, symbol: &str) -> Option<(&Asset, &Asset)> {
        if self.asset_a.symbol == symbol {
            Some((&self.asset_a, &self.asset_b))
        } else if self.asset_b.symbol == symbol {
            Some((&self.asset_b, &self.asset_a))
        } else {
            None
        }
    }
}

/// Live composition of a pool at fetch time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolState {
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
    pub total_shares: Decimal,
}
