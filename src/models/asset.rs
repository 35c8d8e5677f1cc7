use serde::{Deserialize, Serialize};

/// How an asset participates in valuation. Declared in configuration, never
/// inferred from symbol strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    /// Asserted to trade at ~1 USD per unit.
    Stable,
    Volatile,
}

/// A pool constituent as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub role: AssetRole,
    /// On-chain integer precision: raw chain amounts are divided by
    /// 10^precision before any arithmetic.
    #[serde(default)]
    pub precision: u32,
}

impl Asset {
    pub fn stable(symbol: impl Into<String>, precision: u32) -> Self {
        Self {
            symbol: symbol.into(),
            role: AssetRole::Stable,
            precision,
        }
    }

    pub fn volatile(symbol: impl Into<String>, precision: u32) -> Self {
        Self {
            symbol: symbol.into(),
            role: AssetRole::Volatile,
            precision,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.role == AssetRole::Stable
    }
}
