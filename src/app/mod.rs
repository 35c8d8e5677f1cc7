use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{MissingPoolPolicy, ResolvedConfig};
use crate::format::format_usd_display;
use crate::history::JsonlHistoryStore;
use crate::models::{Holding, PortfolioName, Snapshot, ValuationStrategy};
use crate::source::PoolDataSource;
use crate::valuation::{PortfolioValuator, RunData};

/// Result of one full refresh: a freshly recorded snapshot per portfolio plus
/// the grand total across portfolios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshOutput {
    pub timestamp: DateTime<Utc>,
    pub snapshots: Vec<Snapshot>,
    pub grand_total_usd: String,
    pub grand_total_display: String,
}

/// Orchestrates refresh runs: fetch, value, persist.
///
/// Runs are serialized through an internal lock so two concurrent refreshes
/// cannot interleave history appends.
pub struct RefreshService {
    config: Arc<ResolvedConfig>,
    source: Arc<dyn PoolDataSource>,
    clock: Arc<dyn Clock>,
    run_lock: Mutex<()>,
}

impl RefreshService {
    pub fn new(
        config: Arc<ResolvedConfig>,
        source: Arc<dyn PoolDataSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            clock,
            run_lock: Mutex::new(()),
        }
    }

    pub async fn refresh(&self) -> Result<RefreshOutput> {
        let _guard = self.run_lock.lock().await;
        let timestamp = self.clock.now();

        let run = self.collect_run_data().await?;

        let valuator = PortfolioValuator::new(
            &self.config.registry,
            self.config.missing_pool_policy,
            &self.config.source.reference_symbol,
        );

        let store = JsonlHistoryStore::new(&self.config.data_dir);

        // Value every portfolio and validate every append before the first
        // write: a run that fails partway must leave history untouched.
        let mut pending = Vec::new();
        for definition in &self.config.portfolios {
            let snapshot = valuator
                .build_snapshot(definition, &run, &self.config.accounts, timestamp)
                .with_context(|| format!("Failed to value portfolio {}", definition.name))?;

            let series = store
                .load(definition.name)
                .await
                .with_context(|| format!("Failed to load history for {}", definition.name))?;
            series
                .check_append(snapshot.timestamp)
                .with_context(|| format!("Cannot record snapshot for {}", definition.name))?;

            pending.push((series, snapshot));
        }

        let mut snapshots = Vec::new();
        let mut grand_total = Decimal::ZERO;
        for (mut series, snapshot) in pending {
            let portfolio = series.portfolio();
            store
                .append(&mut series, snapshot.clone())
                .await
                .with_context(|| format!("Failed to record snapshot for {}", portfolio))?;

            info!(
                %portfolio,
                total_usd = %snapshot.total_usd,
                pools = snapshot.pools.len(),
                "recorded snapshot"
            );

            grand_total += parse_decimal(&snapshot.total_usd)?;
            snapshots.push(snapshot);
        }

        Ok(RefreshOutput {
            timestamp,
            snapshots,
            grand_total_usd: grand_total.normalize().to_string(),
            grand_total_display: format_usd_display(grand_total, &self.config.display),
        })
    }

    /// Fetch everything the valuator needs in one pass. Each assigned pool's
    /// state is fetched once; the reference price only when some assigned
    /// pool prices against it.
    async fn collect_run_data(&self) -> Result<RunData> {
        let mut run = RunData::default();
        let mut needs_reference_price = false;

        for pool in self.config.registry.iter() {
            if pool.skip_valuation || !self.config.is_assigned(&pool.id) {
                continue;
            }
            if pool.strategy == ValuationStrategy::CrossReference {
                needs_reference_price = true;
            }

            match self.source.fetch_pool_state(pool).await {
                Ok(state) => {
                    run.states.insert(pool.id.clone(), state);
                }
                Err(e) => match self.config.missing_pool_policy {
                    MissingPoolPolicy::FailFast => {
                        return Err(e)
                            .with_context(|| format!("Failed to fetch state for pool {}", pool.id));
                    }
                    MissingPoolPolicy::MarkMissing => {
                        warn!(pool = %pool.id, error = %e, "pool state unavailable");
                        continue;
                    }
                },
            }

            // A failed balance fetch follows the same policy as a failed
            // state fetch: the pool is marked missing as a whole rather than
            // priced from partial holdings.
            let mut pool_holdings = Vec::new();
            let mut balance_error = None;
            for account in &self.config.accounts {
                match self.source.fetch_share_balance(account, pool).await {
                    Ok(shares) => {
                        pool_holdings.push(Holding::new(account.clone(), pool.id.clone(), shares));
                    }
                    Err(e) => {
                        balance_error = Some((account.clone(), e));
                        break;
                    }
                }
            }
            match balance_error {
                None => run.holdings.extend(pool_holdings),
                Some((account, e)) => match self.config.missing_pool_policy {
                    MissingPoolPolicy::FailFast => {
                        return Err(e).with_context(|| {
                            format!("Failed to fetch {} balance for {}", pool.id, account)
                        });
                    }
                    MissingPoolPolicy::MarkMissing => {
                        warn!(pool = %pool.id, %account, error = %e, "share balance unavailable");
                        run.states.remove(&pool.id);
                    }
                },
            }
        }

        if needs_reference_price {
            let symbol = &self.config.source.reference_symbol;
            match self.source.fetch_reference_price(symbol).await {
                Ok(price) => run.reference_price = Some(price),
                Err(e) => match self.config.missing_pool_policy {
                    MissingPoolPolicy::FailFast => {
                        return Err(e).with_context(|| {
                            format!("Failed to fetch reference price for {symbol}")
                        });
                    }
                    MissingPoolPolicy::MarkMissing => {
                        warn!(%symbol, error = %e, "reference price unavailable");
                    }
                },
            }
        }

        Ok(run)
    }
}

/// Most recent recorded snapshot for one portfolio, if any.
pub async fn latest_snapshot(
    config: &ResolvedConfig,
    portfolio: PortfolioName,
) -> Result<Option<Snapshot>> {
    let store = JsonlHistoryStore::new(&config.data_dir);
    store.latest(portfolio).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub initial_value: String,
    pub final_value: String,
    pub absolute_change: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryOutput {
    pub portfolio: PortfolioName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub snapshots: Vec<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<HistorySummary>,
}

/// Recorded snapshots within an inclusive time window, with first/last change
/// figures when the window holds at least one snapshot.
pub async fn history_range(
    config: &ResolvedConfig,
    portfolio: PortfolioName,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<HistoryOutput> {
    let store = JsonlHistoryStore::new(&config.data_dir);
    let series = store.load(portfolio).await?;
    let snapshots: Vec<Snapshot> = series.range(start, end).cloned().collect();

    let summary = match (snapshots.first(), snapshots.last()) {
        (Some(first), Some(last)) => {
            let initial = parse_decimal(&first.total_usd)?;
            let final_value = parse_decimal(&last.total_usd)?;
            Some(HistorySummary {
                initial_value: first.total_usd.clone(),
                final_value: last.total_usd.clone(),
                absolute_change: (final_value - initial).normalize().to_string(),
            })
        }
        _ => None,
    };

    Ok(HistoryOutput {
        portfolio,
        start,
        end,
        snapshots,
        summary,
    })
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal value {value:?}"))
}
