//! Yield Scanner (spec §4.5, component C5).
//!
//! Fans out across adapters concurrently with `futures::future::join_all`-
//! equivalent `tokio::join_all`-style fanout (we use `join_all` from the
//! `futures` crate family available transitively via `alloy`/`reqwest`'s
//! async stack — here expressed directly with an iterator of boxed
//! futures awaited via `futures_util::future::join_all`). Shares one
//! [`crate::oracle::PriceOracle`] across every adapter, matching the
//! spec's explicit warning that per-adapter oracles would thrash the
//! staleness cache.

use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::Result;
use crate::venues::{Adapter, ApyReading, PoolInfo, VenueAdapter};

#[derive(Debug, Clone)]
pub struct YieldOpportunity {
    pub protocol_id: String,
    pub pool_id: String,
    pub token: String,
    pub apy: Decimal,
    pub tvl_usd: Decimal,
    pub pool: PoolSummary,
}

/// A trimmed, cloneable view of the pool backing an opportunity — the
/// full [`PoolInfo`] holds adapter-internal detail the strategy layer
/// doesn't need.
#[derive(Debug, Clone)]
pub struct PoolSummary {
    pub protocol_id: String,
    pub pool_id: String,
    pub tvl_is_estimate: bool,
}

pub struct YieldScanner {
    adapters: Vec<Arc<Adapter>>,
    min_tvl_usd: Decimal,
}

impl YieldScanner {
    pub fn new(adapters: Vec<Arc<Adapter>>, min_tvl_usd: Decimal) -> Self {
        YieldScanner { adapters, min_tvl_usd }
    }

    pub async fn scan_all(&self) -> Result<Vec<YieldOpportunity>> {
        let futures = self.adapters.iter().map(|adapter| {
            let adapter = adapter.clone();
            async move { adapter.get_pools().await }
        });
        let results = futures_util::future::join_all(futures).await;

        let mut opportunities = Vec::new();
        for result in results {
            // One adapter's failure doesn't abort the whole scan — its
            // pools are simply absent this tick, matching the spec's
            // "bounded parallelism, normalized opportunity set" contract.
            if let Ok(pools) = result {
                opportunities.extend(pools.into_iter().filter_map(to_opportunity));
            }
        }
        Ok(self.normalize(opportunities))
    }

    pub async fn scan_one(&self, protocol_id: &str) -> Result<Vec<YieldOpportunity>> {
        let adapter = self.adapters.iter().find(|a| a.protocol_id() == protocol_id);
        let Some(adapter) = adapter else { return Ok(Vec::new()) };
        let pools = adapter.get_pools().await?;
        Ok(self.normalize(pools.into_iter().filter_map(to_opportunity).collect()))
    }

    fn normalize(&self, mut opportunities: Vec<YieldOpportunity>) -> Vec<YieldOpportunity> {
        opportunities.retain(|o| o.tvl_usd >= self.min_tvl_usd);
        opportunities.sort_by(|a, b| {
            b.apy
                .cmp(&a.apy)
                .then_with(|| a.protocol_id.cmp(&b.protocol_id))
                .then_with(|| a.pool_id.cmp(&b.pool_id))
        });
        opportunities
    }
}

/// `None` when the pool's APY couldn't be honestly computed — filtered
/// out here rather than surfaced as a zero-yield opportunity.
fn to_opportunity(pool: PoolInfo) -> Option<YieldOpportunity> {
    let apy = match pool.apy {
        ApyReading::Known(apy) => apy,
        ApyReading::Unknown => return None,
    };
    let token = pool.tokens.first()?.clone();
    Some(YieldOpportunity {
        protocol_id: pool.protocol_id.clone(),
        pool_id: pool.pool_id.clone(),
        token,
        apy,
        tvl_usd: pool.tvl_usd,
        pool: PoolSummary {
            protocol_id: pool.protocol_id,
            pool_id: pool.pool_id,
            tvl_is_estimate: pool.tvl_is_estimate,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn opportunity(protocol: &str, pool: &str, apy: Decimal, tvl: Decimal) -> YieldOpportunity {
        YieldOpportunity {
            protocol_id: protocol.to_string(),
            pool_id: pool.to_string(),
            token: "USDC".to_string(),
            apy,
            tvl_usd: tvl,
            pool: PoolSummary { protocol_id: protocol.to_string(), pool_id: pool.to_string(), tvl_is_estimate: false },
        }
    }

    #[test]
    fn sorts_by_apy_descending_with_stable_tiebreak() {
        let scanner = YieldScanner::new(vec![], Decimal::ZERO);
        let input = vec![
            opportunity("aave", "usdc", dec!(5), dec!(1_000_000)),
            opportunity("moonwell", "usdc", dec!(8), dec!(1_000_000)),
            opportunity("aave", "weth", dec!(8), dec!(1_000_000)),
        ];
        let sorted = scanner.normalize(input);
        assert_eq!(sorted[0].protocol_id, "aave");
        assert_eq!(sorted[0].pool_id, "weth");
        assert_eq!(sorted[1].protocol_id, "moonwell");
        assert_eq!(sorted[2].protocol_id, "aave");
        assert_eq!(sorted[2].pool_id, "usdc");
    }

    #[test]
    fn filters_below_min_tvl_floor() {
        let scanner = YieldScanner::new(vec![], dec!(500_000));
        let input = vec![
            opportunity("aave", "usdc", dec!(5), dec!(1_000_000)),
            opportunity("small", "pool", dec!(20), dec!(100)),
        ];
        let sorted = scanner.normalize(input);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].protocol_id, "aave");
    }

    #[test]
    fn unknown_apy_pools_are_excluded() {
        let pool = PoolInfo {
            protocol_id: "aerodrome".into(),
            pool_id: "weth-usdc".into(),
            tokens: vec!["WETH".into(), "USDC".into()],
            kind: crate::venues::PoolKind::Amm {
                token0: "WETH".into(),
                token1: "USDC".into(),
                reserve0: dec!(10),
                reserve1: dec!(30000),
            },
            apy: ApyReading::Unknown,
            tvl_usd: dec!(1_000_000),
            tvl_is_estimate: false,
        };
        assert!(to_opportunity(pool).is_none());
    }
}
