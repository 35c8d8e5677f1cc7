mod pricing;

pub use pricing::{resolve_share_price, ResolvedPrice};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::{MissingPoolPolicy, PortfolioDefinition, Registry};
use crate::error::ValuationError;
use crate::models::{AccountId, Holding, PoolConfig, PoolContribution, PoolId, PoolState, Snapshot};

/// Value one holding at a resolved per-share price. Pure.
pub fn value_holding(holding: &Holding, usd_per_share: Decimal) -> Result<Decimal, ValuationError> {
    if holding.shares.is_sign_negative() {
        // Should not occur given the data-source contract, but the quantity
        // originates externally and must be checked.
        return Err(ValuationError::NegativeQuantity {
            account: holding.account.clone(),
            pool: holding.pool.clone(),
            shares: holding.shares,
        });
    }
    Ok(holding.shares * usd_per_share)
}

/// Everything fetched from the data source for one run.
#[derive(Debug, Clone, Default)]
pub struct RunData {
    pub states: HashMap<PoolId, PoolState>,
    pub reference_price: Option<Decimal>,
    pub holdings: Vec<Holding>,
}

/// Rolls per-pool valuations into portfolio snapshots.
///
/// A pool's price is resolved once per run and reused for every holding of
/// that pool; the breakdown keeps the portfolio's configured pool order.
pub struct PortfolioValuator<'a> {
    registry: &'a Registry,
    policy: MissingPoolPolicy,
    reference_symbol: &'a str,
}

impl<'a> PortfolioValuator<'a> {
    pub fn new(
        registry: &'a Registry,
        policy: MissingPoolPolicy,
        reference_symbol: &'a str,
    ) -> Self {
        Self {
            registry,
            policy,
            reference_symbol,
        }
    }

    pub fn build_snapshot(
        &self,
        definition: &PortfolioDefinition,
        run: &RunData,
        accounts: &[AccountId],
        timestamp: DateTime<Utc>,
    ) -> Result<Snapshot, ValuationError> {
        let mut price_cache: HashMap<PoolId, ResolvedPrice> = HashMap::new();
        let mut contributions = Vec::new();
        let mut total = Decimal::ZERO;

        for pool_id in &definition.pools {
            let pool = self.registry.get(pool_id).ok_or_else(|| {
                ValuationError::UnsupportedPoolConfiguration {
                    pool: pool_id.clone(),
                    reason: "pool not present in registry".to_string(),
                }
            })?;
            if pool.skip_valuation {
                continue;
            }

            let priced = match self.price_pool(pool, run, &mut price_cache) {
                Ok(priced) => priced,
                Err(e) => match self.policy {
                    MissingPoolPolicy::FailFast => return Err(e),
                    MissingPoolPolicy::MarkMissing => {
                        warn!(pool = %pool.id, error = %e, "pool left unpriced in snapshot");
                        contributions.push(PoolContribution {
                            pool_id: pool.id.clone(),
                            label: pool.label.clone(),
                            value_usd: None,
                            share_ratio: None,
                        });
                        continue;
                    }
                },
            };

            let mut pool_value = Decimal::ZERO;
            let mut owned_shares = Decimal::ZERO;
            for holding in run.holdings.iter().filter(|h| h.pool == *pool_id) {
                match value_holding(holding, priced.usd_per_share) {
                    Ok(value) => {
                        pool_value += value;
                        owned_shares += holding.shares;
                    }
                    Err(e) => match self.policy {
                        MissingPoolPolicy::FailFast => return Err(e),
                        MissingPoolPolicy::MarkMissing => {
                            warn!(
                                account = %holding.account,
                                pool = %holding.pool,
                                error = %e,
                                "excluding malformed holding"
                            );
                        }
                    },
                }
            }

            // total_shares is nonzero whenever pricing succeeded
            let share_ratio = run
                .states
                .get(pool_id)
                .map(|state| owned_shares / state.total_shares);

            contributions.push(PoolContribution {
                pool_id: pool.id.clone(),
                label: pool.label.clone(),
                value_usd: Some(decimal_to_string(pool_value)),
                share_ratio: share_ratio.map(decimal_to_string),
            });
            total += pool_value;
        }

        Ok(Snapshot {
            timestamp,
            portfolio: definition.name,
            accounts: accounts.to_vec(),
            total_usd: decimal_to_string(total),
            pools: contributions,
        })
    }

    fn price_pool(
        &self,
        pool: &PoolConfig,
        run: &RunData,
        cache: &mut HashMap<PoolId, ResolvedPrice>,
    ) -> Result<ResolvedPrice, ValuationError> {
        if let Some(priced) = cache.get(&pool.id) {
            return Ok(*priced);
        }
        let state = run.states.get(&pool.id).ok_or_else(|| {
            ValuationError::DataUnavailable(format!("no live state for pool {}", pool.id))
        })?;
        let priced =
            resolve_share_price(pool, state, run.reference_price, self.reference_symbol)?;
        debug!(
            pool = %pool.label,
            usd_per_share = %priced.usd_per_share,
            counter_unit_price = ?priced.counter_unit_price,
            "resolved pool price"
        );
        cache.insert(pool.id.clone(), priced);
        Ok(priced)
    }
}

fn decimal_to_string(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, ValuationStrategy};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn pool(id: &str, label: &str, a: Asset, b: Asset, strategy: ValuationStrategy) -> PoolConfig {
        PoolConfig {
            id: PoolId::from(id),
            label: label.to_string(),
            asset_a: a,
            asset_b: b,
            strategy,
            price_reference: false,
            skip_valuation: false,
        }
    }

    fn registry() -> Registry {
        Registry::new(vec![
            pool(
                "1.19.1",
                "USDT/USDC",
                Asset::stable("USDT", 6),
                Asset::stable("USDC", 6),
                ValuationStrategy::StableDouble,
            ),
            pool(
                "1.19.2",
                "TWENTIX/RVN",
                Asset::volatile("TWENTIX", 5),
                Asset::volatile("RVN", 8),
                ValuationStrategy::CrossReference,
            ),
        ])
        .unwrap()
    }

    fn state(a: i64, b: i64, shares: i64) -> PoolState {
        PoolState {
            reserve_a: Decimal::from(a),
            reserve_b: Decimal::from(b),
            total_shares: Decimal::from(shares),
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
    }

    fn core_definition() -> PortfolioDefinition {
        PortfolioDefinition {
            name: crate::models::PortfolioName::Core,
            pools: vec![PoolId::from("1.19.1")],
        }
    }

    fn growth_definition() -> PortfolioDefinition {
        PortfolioDefinition {
            name: crate::models::PortfolioName::Growth,
            pools: vec![PoolId::from("1.19.2")],
        }
    }

    #[test]
    fn value_holding_is_linear_in_share_quantity() {
        let price = Decimal::from_str("1.25").unwrap();
        let q = Holding::new("1.2.100".into(), "1.19.1".into(), Decimal::from(40));
        let double_q = Holding::new("1.2.100".into(), "1.19.1".into(), Decimal::from(80));
        assert_eq!(
            value_holding(&q, price).unwrap() * Decimal::TWO,
            value_holding(&double_q, price).unwrap()
        );
    }

    #[test]
    fn value_holding_rejects_negative_quantity() {
        let holding = Holding::new("1.2.100".into(), "1.19.1".into(), Decimal::from(-1));
        let err = value_holding(&holding, Decimal::ONE).unwrap_err();
        assert!(matches!(err, ValuationError::NegativeQuantity { .. }));
    }

    #[test]
    fn core_snapshot_matches_worked_example() {
        // 1000 USDT + 1000 USDC, 2000 shares, account holds 100 shares.
        let registry = registry();
        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(1000, 1000, 2000));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.1".into(),
            Decimal::from(100),
        ));

        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&core_definition(), &run, &["1.2.100".into()], timestamp())
            .unwrap();

        assert_eq!(snapshot.total_usd, "100");
        assert_eq!(snapshot.pools.len(), 1);
        assert_eq!(snapshot.pools[0].value_usd.as_deref(), Some("100"));
        assert_eq!(snapshot.pools[0].share_ratio.as_deref(), Some("0.05"));
    }

    #[test]
    fn growth_snapshot_matches_worked_example() {
        // TWENTIX/RVN, 500/1000 reserves, 1000 shares, price(TWENTIX)=2.0,
        // account holds 50 shares: pool value 2000, per-share 2, holding 100.
        let registry = registry();
        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.2"), state(500, 1000, 1000));
        run.reference_price = Some(Decimal::TWO);
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.2".into(),
            Decimal::from(50),
        ));

        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&growth_definition(), &run, &["1.2.100".into()], timestamp())
            .unwrap();

        assert_eq!(snapshot.total_usd, "100");
        assert_eq!(snapshot.pools[0].value_usd.as_deref(), Some("100"));
    }

    #[test]
    fn holdings_sum_across_accounts() {
        let registry = registry();
        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(1000, 1000, 2000));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.1".into(),
            Decimal::from(30),
        ));
        run.holdings.push(Holding::new(
            "1.2.200".into(),
            "1.19.1".into(),
            Decimal::from(70),
        ));

        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(
                &core_definition(),
                &run,
                &["1.2.100".into(), "1.2.200".into()],
                timestamp(),
            )
            .unwrap();

        assert_eq!(snapshot.total_usd, "100");
    }

    #[test]
    fn breakdown_sums_to_total() {
        let registry = Registry::new(vec![
            pool(
                "1.19.1",
                "USDT/USDC",
                Asset::stable("USDT", 6),
                Asset::stable("USDC", 6),
                ValuationStrategy::StableDouble,
            ),
            pool(
                "1.19.3",
                "HONEST.USD/USDT",
                Asset::stable("HONEST.USD", 4),
                Asset::stable("USDT", 6),
                ValuationStrategy::StableDouble,
            ),
        ])
        .unwrap();

        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(997, 1003, 1700));
        run.states.insert(PoolId::from("1.19.3"), state(311, 289, 433));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.1".into(),
            Decimal::from_str("123.4567").unwrap(),
        ));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.3".into(),
            Decimal::from_str("77.01").unwrap(),
        ));

        let definition = PortfolioDefinition {
            name: crate::models::PortfolioName::Core,
            pools: vec![PoolId::from("1.19.1"), PoolId::from("1.19.3")],
        };
        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&definition, &run, &["1.2.100".into()], timestamp())
            .unwrap();

        let sum: Decimal = snapshot
            .pools
            .iter()
            .map(|c| Decimal::from_str(c.value_usd.as_deref().unwrap()).unwrap())
            .sum();
        assert_eq!(sum, Decimal::from_str(&snapshot.total_usd).unwrap());
    }

    #[test]
    fn breakdown_preserves_configured_pool_order() {
        let registry = registry();
        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(1000, 1000, 2000));
        run.states.insert(PoolId::from("1.19.2"), state(500, 1000, 1000));
        run.reference_price = Some(Decimal::TWO);
        // Holdings arrive in the opposite order.
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.2".into(),
            Decimal::from(1),
        ));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.1".into(),
            Decimal::from(1),
        ));

        let definition = PortfolioDefinition {
            name: crate::models::PortfolioName::Core,
            pools: vec![PoolId::from("1.19.2"), PoolId::from("1.19.1")],
        };
        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&definition, &run, &["1.2.100".into()], timestamp())
            .unwrap();

        let ids: Vec<&str> = snapshot.pools.iter().map(|c| c.pool_id.as_str()).collect();
        assert_eq!(ids, vec!["1.19.2", "1.19.1"]);
    }

    #[test]
    fn uncategorized_pool_never_appears_in_breakdown() {
        let registry = registry();
        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(1000, 1000, 2000));
        // Holding references a pool that is in the registry but not in the
        // portfolio definition.
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.2".into(),
            Decimal::from(50),
        ));
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.1".into(),
            Decimal::from(10),
        ));

        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&core_definition(), &run, &["1.2.100".into()], timestamp())
            .unwrap();

        assert_eq!(snapshot.pools.len(), 1);
        assert_eq!(snapshot.pools[0].pool_id.as_str(), "1.19.1");
        assert_eq!(snapshot.total_usd, "10");
    }

    #[test]
    fn fail_fast_aborts_snapshot_on_unpriceable_pool() {
        let registry = registry();
        let run = RunData::default(); // no live state at all
        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let err = valuator
            .build_snapshot(&core_definition(), &run, &[], timestamp())
            .unwrap_err();
        assert!(matches!(err, ValuationError::DataUnavailable(_)));
    }

    #[test]
    fn mark_missing_records_gap_and_excludes_from_total() {
        let registry = registry();
        let mut run = RunData::default();
        // Growth pool priceable, core pool missing.
        run.states.insert(PoolId::from("1.19.2"), state(500, 1000, 1000));
        run.reference_price = Some(Decimal::TWO);
        run.holdings.push(Holding::new(
            "1.2.100".into(),
            "1.19.2".into(),
            Decimal::from(50),
        ));

        let definition = PortfolioDefinition {
            name: crate::models::PortfolioName::Growth,
            pools: vec![PoolId::from("1.19.1"), PoolId::from("1.19.2")],
        };
        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::MarkMissing, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&definition, &run, &["1.2.100".into()], timestamp())
            .unwrap();

        assert_eq!(snapshot.pools.len(), 2);
        assert!(snapshot.pools[0].value_usd.is_none());
        assert_eq!(snapshot.pools[1].value_usd.as_deref(), Some("100"));
        // The gap is excluded, not zeroed; the total only covers priced pools.
        assert_eq!(snapshot.total_usd, "100");
    }

    #[test]
    fn skip_valuation_pool_is_left_out() {
        let mut pools: Vec<PoolConfig> = vec![
            pool(
                "1.19.1",
                "USDT/USDC",
                Asset::stable("USDT", 6),
                Asset::stable("USDC", 6),
                ValuationStrategy::StableDouble,
            ),
            pool(
                "1.19.4",
                "TWENTIX/USDT",
                Asset::volatile("TWENTIX", 5),
                Asset::stable("USDT", 6),
                ValuationStrategy::CrossReference,
            ),
        ];
        pools[1].skip_valuation = true;
        let registry = Registry::new(pools).unwrap();

        let mut run = RunData::default();
        run.states.insert(PoolId::from("1.19.1"), state(1000, 1000, 2000));

        let definition = PortfolioDefinition {
            name: crate::models::PortfolioName::Core,
            pools: vec![PoolId::from("1.19.1"), PoolId::from("1.19.4")],
        };
        let valuator =
            PortfolioValuator::new(&registry, MissingPoolPolicy::FailFast, "TWENTIX");
        let snapshot = valuator
            .build_snapshot(&definition, &run, &[], timestamp())
            .unwrap();

        assert_eq!(snapshot.pools.len(), 1);
        assert_eq!(snapshot.pools[0].pool_id.as_str(), "1.19.1");
    }
}
