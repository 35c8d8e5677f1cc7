use rust_decimal::Decimal;

use crate::error::ValuationError;
use crate::models::{PoolConfig, PoolState, ValuationStrategy};

/// Price of one pool share plus the intermediate figures used to derive it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPrice {
    pub usd_per_share: Decimal,
    pub pool_value_usd: Decimal,
    /// Implied USD price of one unit of the non-reference asset. Only set for
    /// cross-reference pools with a nonzero non-reference reserve.
    pub counter_unit_price: Option<Decimal>,
}

/// Resolve the USD value of one pool share under the pool's declared strategy.
///
/// `reference_price` is the reference asset's current USD market price; it is
/// only consulted for cross-reference pools.
pub fn resolve_share_price(
    pool: &PoolConfig,
    state: &PoolState,
    reference_price: Option<Decimal>,
    reference_symbol: &str,
) -> Result<ResolvedPrice, ValuationError> {
    if state.reserve_a.is_sign_negative() || state.reserve_b.is_sign_negative() {
        return Err(unsupported(pool, "negative reserve quantity"));
    }
    if state.total_shares.is_sign_negative() {
        return Err(unsupported(pool, "negative share supply"));
    }
    if state.total_shares.is_zero() {
        // Price is undefined; configuration or data error, never a zero.
        return Err(unsupported(pool, "zero outstanding share supply"));
    }

    match pool.strategy {
        ValuationStrategy::StableDouble => {
            if !pool.asset_a.is_stable() || !pool.asset_b.is_stable() {
                return Err(unsupported(
                    pool,
                    "stable_double requires both assets tagged stable",
                ));
            }
            // Each stable unit is assumed to trade at 1 USD, so the pool is
            // worth the sum of both reserves.
            let pool_value_usd = state.reserve_a + state.reserve_b;
            Ok(ResolvedPrice {
                usd_per_share: pool_value_usd / state.total_shares,
                pool_value_usd,
                counter_unit_price: None,
            })
        }
        ValuationStrategy::CrossReference => {
            let (reference_reserve, counter_reserve) =
                if pool.asset_a.symbol == reference_symbol {
                    (state.reserve_a, state.reserve_b)
                } else if pool.asset_b.symbol == reference_symbol {
                    (state.reserve_b, state.reserve_a)
                } else {
                    return Err(unsupported(
                        pool,
                        &format!(
                            "cross_reference requires one side to be the reference asset {reference_symbol}"
                        ),
                    ));
                };

            let reference_price = reference_price.ok_or_else(|| {
                ValuationError::DataUnavailable(format!(
                    "reference price for {reference_symbol} not available"
                ))
            })?;

            // Both sides of a balanced pool are equal in value at the pool's
            // internal price, so the pool is worth twice its reference side.
            let pool_value_usd = reference_price * Decimal::TWO * reference_reserve;
            let counter_unit_price = if counter_reserve.is_zero() {
                None
            } else {
                Some(reference_price * reference_reserve / counter_reserve)
            };

            Ok(ResolvedPrice {
                usd_per_share: pool_value_usd / state.total_shares,
                pool_value_usd,
                counter_unit_price,
            })
        }
    }
}

fn unsupported(pool: &PoolConfig, reason: &str) -> ValuationError {
    ValuationError::UnsupportedPoolConfiguration {
        pool: pool.id.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, PoolId};
    use std::str::FromStr;

    fn stable_pool() -> PoolConfig {
        PoolConfig {
            id: PoolId::from("1.19.1"),
            label: "USDT/USDC".to_string(),
            asset_a: Asset::stable("USDT", 6),
            asset_b: Asset::stable("USDC", 6),
            strategy: ValuationStrategy::StableDouble,
            price_reference: false,
            skip_valuation: false,
        }
    }

    fn growth_pool() -> PoolConfig {
        PoolConfig {
            id: PoolId::from("1.19.2"),
            label: "TWENTIX/RVN".to_string(),
            asset_a: Asset::volatile("TWENTIX", 5),
            asset_b: Asset::volatile("RVN", 8),
            strategy: ValuationStrategy::CrossReference,
            price_reference: false,
            skip_valuation: false,
        }
    }

    fn state(a: i64, b: i64, shares: i64) -> PoolState {
        PoolState {
            reserve_a: Decimal::from(a),
            reserve_b: Decimal::from(b),
            total_shares: Decimal::from(shares),
        }
    }

    #[test]
    fn stable_double_sums_both_reserves() {
        let priced =
            resolve_share_price(&stable_pool(), &state(1000, 1000, 2000), None, "TWENTIX")
                .unwrap();
        assert_eq!(priced.usd_per_share, Decimal::ONE);
        assert_eq!(priced.pool_value_usd, Decimal::from(2000));
    }

    #[test]
    fn stable_double_uneven_reserves() {
        let priced =
            resolve_share_price(&stable_pool(), &state(750, 250, 500), None, "TWENTIX").unwrap();
        assert_eq!(priced.usd_per_share, Decimal::TWO);
    }

    #[test]
    fn cross_reference_doubles_reference_side() {
        let priced = resolve_share_price(
            &growth_pool(),
            &state(500, 1000, 1000),
            Some(Decimal::TWO),
            "TWENTIX",
        )
        .unwrap();
        // 2.0 x 2 x 500 = 2000 pool value, 1000 shares
        assert_eq!(priced.pool_value_usd, Decimal::from(2000));
        assert_eq!(priced.usd_per_share, Decimal::TWO);
        assert_eq!(priced.counter_unit_price, Some(Decimal::ONE));
    }

    #[test]
    fn cross_reference_works_with_reference_on_either_side() {
        let mut flipped = growth_pool();
        std::mem::swap(&mut flipped.asset_a, &mut flipped.asset_b);
        let priced = resolve_share_price(
            &flipped,
            &state(1000, 500, 1000),
            Some(Decimal::TWO),
            "TWENTIX",
        )
        .unwrap();
        assert_eq!(priced.usd_per_share, Decimal::TWO);
    }

    #[test]
    fn cross_reference_value_depends_only_on_reference_side() {
        // Scaling the counter reserve does not move the pool's USD value:
        // both sides are equal in value at the pool's internal price.
        let price = Some(Decimal::from_str("0.003").unwrap());
        let base = resolve_share_price(&growth_pool(), &state(500, 1000, 1000), price, "TWENTIX")
            .unwrap();
        let doubled =
            resolve_share_price(&growth_pool(), &state(500, 2000, 1000), price, "TWENTIX")
                .unwrap();
        let halved = resolve_share_price(&growth_pool(), &state(500, 500, 1000), price, "TWENTIX")
            .unwrap();
        assert_eq!(base.usd_per_share, doubled.usd_per_share);
        assert_eq!(base.usd_per_share, halved.usd_per_share);
    }

    #[test]
    fn zero_share_supply_is_an_error_not_a_zero() {
        let err =
            resolve_share_price(&stable_pool(), &state(1000, 1000, 0), None, "TWENTIX")
                .unwrap_err();
        assert!(matches!(
            err,
            ValuationError::UnsupportedPoolConfiguration { .. }
        ));
    }

    #[test]
    fn stable_double_rejects_volatile_side() {
        let mut pool = stable_pool();
        pool.asset_b = Asset::volatile("RVN", 8);
        let err = resolve_share_price(&pool, &state(1000, 1000, 2000), None, "TWENTIX")
            .unwrap_err();
        assert!(matches!(
            err,
            ValuationError::UnsupportedPoolConfiguration { .. }
        ));
    }

    #[test]
    fn cross_reference_rejects_pool_without_reference_side() {
        let mut pool = growth_pool();
        pool.asset_a = Asset::volatile("BTC", 8);
        let err = resolve_share_price(
            &pool,
            &state(500, 1000, 1000),
            Some(Decimal::TWO),
            "TWENTIX",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ValuationError::UnsupportedPoolConfiguration { .. }
        ));
    }

    #[test]
    fn cross_reference_without_reference_price_is_unavailable() {
        let err = resolve_share_price(&growth_pool(), &state(500, 1000, 1000), None, "TWENTIX")
            .unwrap_err();
        assert!(matches!(err, ValuationError::DataUnavailable(_)));
    }
}
