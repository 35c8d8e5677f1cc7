mod rpc;

pub use rpc::RpcPoolDataSource;

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::ValuationError;
use crate::models::{AccountId, PoolConfig, PoolId, PoolState};

/// Per-run view of on-chain data.
///
/// Fetch failures surface as [`ValuationError::DataUnavailable`]; a balance
/// the chain simply has no entry for is zero, not an error.
#[async_trait::async_trait]
pub trait PoolDataSource: Send + Sync {
    /// Current reserves and outstanding share supply for a pool.
    async fn fetch_pool_state(&self, pool: &PoolConfig) -> Result<PoolState, ValuationError>;

    /// Pool shares held by one account.
    async fn fetch_share_balance(
        &self,
        account: &AccountId,
        pool: &PoolConfig,
    ) -> Result<Decimal, ValuationError>;

    /// Current USD market price of the reference asset.
    async fn fetch_reference_price(&self, symbol: &str) -> Result<Decimal, ValuationError>;
}

/// In-memory source for tests and offline runs.
#[derive(Default)]
pub struct MemoryPoolDataSource {
    states: tokio::sync::Mutex<HashMap<PoolId, PoolState>>,
    balances: tokio::sync::Mutex<HashMap<(AccountId, PoolId), Decimal>>,
    reference_prices: tokio::sync::Mutex<HashMap<String, Decimal>>,
}

impl MemoryPoolDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_pool_state(&self, pool: PoolId, state: PoolState) {
        self.states.lock().await.insert(pool, state);
    }

    pub async fn set_share_balance(&self, account: AccountId, pool: PoolId, shares: Decimal) {
        self.balances.lock().await.insert((account, pool), shares);
    }

    pub async fn set_reference_price(&self, symbol: impl Into<String>, price: Decimal) {
        self.reference_prices.lock().await.insert(symbol.into(), price);
    }

    pub async fn clear_pool_state(&self, pool: &PoolId) {
        self.states.lock().await.remove(pool);
    }
}

#[async_trait::async_trait]
impl PoolDataSource for MemoryPoolDataSource {
    async fn fetch_pool_state(&self, pool: &PoolConfig) -> Result<PoolState, ValuationError> {
        let states = self.states.lock().await;
        states.get(&pool.id).copied().ok_or_else(|| {
            ValuationError::DataUnavailable(format!("no state for pool {}", pool.id))
        })
    }

    async fn fetch_share_balance(
        &self,
        account: &AccountId,
        pool: &PoolConfig,
    ) -> Result<Decimal, ValuationError> {
        let balances = self.balances.lock().await;
        Ok(balances
            .get(&(account.clone(), pool.id.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn fetch_reference_price(&self, symbol: &str) -> Result<Decimal, ValuationError> {
        let prices = self.reference_prices.lock().await;
        prices.get(symbol).copied().ok_or_else(|| {
            ValuationError::DataUnavailable(format!("no reference price for {symbol}"))
        })
    }
}
