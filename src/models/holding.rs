use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PoolId;

/// Chain account id (e.g. "1.2.1795137").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One account's share position in one pool, rebuilt each run from the data
/// source. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub account: AccountId,
    pub pool: PoolId,
    pub shares: Decimal,
}

impl Holding {
    pub fn new(account: AccountId, pool: PoolId, shares: Decimal) -> Self {
        Self {
            account,
            pool,
            shares,
        }
    }
}
