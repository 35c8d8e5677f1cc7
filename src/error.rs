use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{AccountId, PoolId};

/// Errors produced by the valuation engine.
///
/// None of these may be coerced to a numeric zero: an unpriceable pool or a
/// malformed holding is surfaced, never silently folded into a total.
#[derive(Debug, thiserror::Error)]
pub enum ValuationError {
    /// External fetch failed or timed out. Recovered by skipping the run;
    /// prior history is left untouched.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// A pool's declared strategy does not match its asset pair, or its share
    /// supply is zero so a per-share price is undefined.
    #[error("unsupported pool configuration for {pool}: {reason}")]
    UnsupportedPoolConfiguration { pool: PoolId, reason: String },

    /// A holding arrived from the data source with a negative share quantity.
    #[error("negative share quantity {shares} for account {account} in pool {pool}")]
    NegativeQuantity {
        account: AccountId,
        pool: PoolId,
        shares: Decimal,
    },

    /// Guard against out-of-order corruption of a persisted history series.
    #[error("non-monotonic timestamp: {candidate} precedes last recorded {last}")]
    NonMonotonicTimestamp {
        last: DateTime<Utc>,
        candidate: DateTime<Utc>,
    },
}
