use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::PoolDataSource;
use crate::config::{Registry, SourceConfig};
use crate::error::ValuationError;
use crate::models::{AccountId, PoolConfig, PoolId, PoolState};

/// Pool object fields needed for valuation, cached per instance so one run
/// fetches each pool object once no matter how many accounts hold it.
#[derive(Debug, Clone)]
struct PoolObject {
    balance_a: Decimal,
    balance_b: Decimal,
    share_asset: String,
}

#[derive(Debug, Clone, Copy)]
struct ShareSupply {
    total: Decimal,
    precision: u32,
}

/// JSON-RPC chain source.
///
/// Walks a prioritized endpoint list with a bounded per-request timeout; a
/// failed or timed-out endpoint falls through to the next one. Raw integer
/// chain amounts are scaled by the configured asset precision before any
/// arithmetic. The reference asset's USD price is derived from the registry's
/// `price_reference` pools (USD-side reserve over reference-side reserve,
/// averaged across candidates).
pub struct RpcPoolDataSource {
    client: reqwest::Client,
    endpoints: Vec<String>,
    registry: Registry,
    pool_objects: Mutex<HashMap<PoolId, PoolObject>>,
    share_supplies: Mutex<HashMap<PoolId, ShareSupply>>,
}

impl RpcPoolDataSource {
    pub fn new(source: &SourceConfig, registry: Registry) -> Result<Self> {
        if source.endpoints.is_empty() {
            bail!("No rpc endpoints configured");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(source.timeout_secs))
            .build()
            .context("Failed to build http client")?;
        Ok(Self {
            client,
            endpoints: source.endpoints.clone(),
            registry,
            pool_objects: Mutex::new(HashMap::new()),
            share_supplies: Mutex::new(HashMap::new()),
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ValuationError> {
        let payload = json!({
            "id": 1,
            "method": "call",
            "params": [0, method, params],
        });

        for endpoint in &self.endpoints {
            match self.client.post(endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(body) => {
                            if let Some(result) = body.get("result") {
                                return Ok(result.clone());
                            }
                            warn!(%endpoint, method, "rpc response missing result field");
                        }
                        Err(e) => {
                            warn!(%endpoint, method, error = %e, "failed to decode rpc response")
                        }
                    }
                }
                Ok(response) => {
                    warn!(%endpoint, method, status = %response.status(), "rpc endpoint returned error status")
                }
                Err(e) => warn!(%endpoint, method, error = %e, "rpc request failed"),
            }
        }

        Err(ValuationError::DataUnavailable(format!(
            "all rpc endpoints failed for {method}"
        )))
    }

    async fn get_object(&self, object_id: &str) -> Result<Value, ValuationError> {
        let result = self.rpc_call("get_objects", json!([[object_id]])).await?;
        result
            .get(0)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                ValuationError::DataUnavailable(format!("object {object_id} not found"))
            })
    }

    async fn pool_object(&self, pool: &PoolConfig) -> Result<PoolObject, ValuationError> {
        if let Some(cached) = self.pool_objects.lock().await.get(&pool.id) {
            return Ok(cached.clone());
        }

        let object = self.get_object(pool.id.as_str()).await?;
        let pool_object = PoolObject {
            balance_a: scaled_field(&object, "balance_a", pool.asset_a.precision)
                .map_err(|reason| unavailable(&pool.id, reason))?,
            balance_b: scaled_field(&object, "balance_b", pool.asset_b.precision)
                .map_err(|reason| unavailable(&pool.id, reason))?,
            share_asset: object
                .get("share_asset")
                .and_then(Value::as_str)
                .ok_or_else(|| unavailable(&pool.id, "missing share_asset".to_string()))?
                .to_string(),
        };

        self.pool_objects
            .lock()
            .await
            .insert(pool.id.clone(), pool_object.clone());
        Ok(pool_object)
    }

    /// Outstanding share supply, resolved through the share asset's dynamic
    /// data object.
    async fn share_supply(
        &self,
        pool: &PoolConfig,
        share_asset: &str,
    ) -> Result<ShareSupply, ValuationError> {
        if let Some(cached) = self.share_supplies.lock().await.get(&pool.id) {
            return Ok(*cached);
        }

        let asset = self.get_object(share_asset).await?;
        let precision = asset
            .get("precision")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let dynamic_id = asset
            .get("dynamic_asset_data_id")
            .and_then(Value::as_str)
            .ok_or_else(|| unavailable(&pool.id, "missing dynamic_asset_data_id".to_string()))?
            .to_string();

        let dynamic = self.get_object(&dynamic_id).await?;
        let total = scaled_field(&dynamic, "current_supply", precision)
            .map_err(|reason| unavailable(&pool.id, reason))?;

        let supply = ShareSupply { total, precision };
        self.share_supplies.lock().await.insert(pool.id.clone(), supply);
        Ok(supply)
    }
}

#[async_trait::async_trait]
impl PoolDataSource for RpcPoolDataSource {
    async fn fetch_pool_state(&self, pool: &PoolConfig) -> Result<PoolState, ValuationError> {
        let object = self.pool_object(pool).await?;
        let supply = self.share_supply(pool, &object.share_asset).await?;
        Ok(PoolState {
            reserve_a: object.balance_a,
            reserve_b: object.balance_b,
            total_shares: supply.total,
        })
    }

    async fn fetch_share_balance(
        &self,
        account: &AccountId,
        pool: &PoolConfig,
    ) -> Result<Decimal, ValuationError> {
        let object = self.pool_object(pool).await?;
        let supply = self.share_supply(pool, &object.share_asset).await?;

        let result = self
            .rpc_call(
                "get_account_balances",
                json!([account.as_str(), [object.share_asset]]),
            )
            .await?;

        let entries = result.as_array().cloned().unwrap_or_default();
        for entry in entries {
            if entry.get("asset_id").and_then(Value::as_str) == Some(object.share_asset.as_str()) {
                return scaled_field(&entry, "amount", supply.precision)
                    .map_err(|reason| unavailable(&pool.id, reason));
            }
        }

        // No balance entry means the account holds no shares.
        Ok(Decimal::ZERO)
    }

    async fn fetch_reference_price(&self, symbol: &str) -> Result<Decimal, ValuationError> {
        let mut candidates = Vec::new();

        for pool in self.registry.price_reference_pools() {
            let Some((reference, _)) = pool.side(symbol) else {
                continue;
            };
            let reference_is_a = reference.symbol == pool.asset_a.symbol;

            let object = match self.pool_object(pool).await {
                Ok(object) => object,
                Err(e) => {
                    warn!(pool = %pool.id, error = %e, "skipping unreachable price reference pool");
                    continue;
                }
            };

            let (reference_reserve, usd_reserve) = if reference_is_a {
                (object.balance_a, object.balance_b)
            } else {
                (object.balance_b, object.balance_a)
            };
            if reference_reserve.is_zero() || usd_reserve.is_zero() {
                warn!(pool = %pool.id, "skipping drained price reference pool");
                continue;
            }

            let price = usd_reserve / reference_reserve;
            debug!(pool = %pool.label, price = %price, "reference price candidate");
            candidates.push(price);
        }

        if candidates.is_empty() {
            return Err(ValuationError::DataUnavailable(format!(
                "no usable price reference pool for {symbol}"
            )));
        }

        let sum: Decimal = candidates.iter().sum();
        Ok(sum / Decimal::from(candidates.len() as u64))
    }
}

fn unavailable(pool: &PoolId, reason: String) -> ValuationError {
    ValuationError::DataUnavailable(format!("pool {pool}: {reason}"))
}

/// Read a raw integer chain amount and scale it by 10^precision.
fn scaled_field(object: &Value, key: &str, precision: u32) -> Result<Decimal, String> {
    let value = object
        .get(key)
        .ok_or_else(|| format!("missing field {key}"))?;
    let raw: i128 = match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| format!("field {key} is not an integer amount: {s:?}"))?,
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| format!("field {key} is not an integer amount: {n}"))?,
        other => return Err(format!("field {key} has unexpected type: {other}")),
    };
    Decimal::try_from_i128_with_scale(raw, precision)
        .map_err(|e| format!("field {key} out of range: {e}"))
}
