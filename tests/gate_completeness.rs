//! A `RebalanceRecommendation` must only come out of a strategy when
//! both the profitability gates and the risk gate clear (spec §8's
//! "gate completeness" invariant) — exercised here through the public
//! `Strategy::analyze` entry point rather than by calling
//! `profitability::evaluate`/`risk::assess_rebalance` directly, so the
//! wiring between the two gates and the strategy layer is what's under
//! test, not the gates in isolation.

use chrono::Utc;
use mammon_core::model::{Position, PositionStatus};
use mammon_core::profitability::ProfitabilityThresholds;
use mammon_core::risk::PortfolioContext;
use mammon_core::scanner::{PoolSummary, YieldOpportunity};
use mammon_core::strategy::aggressive::AggressiveStrategy;
use mammon_core::strategy::Strategy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn position(apy: Decimal, size_usd: Decimal) -> Position {
    Position {
        wallet_address: "0xabc".into(),
        protocol_id: "aave".into(),
        pool_id: "aave-pool".into(),
        token: "USDC".into(),
        amount: size_usd,
        usd_value_snapshot: size_usd,
        entry_apy: apy,
        current_apy: apy,
        opened_at: Utc::now(),
        closed_at: None,
        status: PositionStatus::Active,
    }
}

fn target(apy: Decimal, tvl_usd: Decimal) -> YieldOpportunity {
    YieldOpportunity {
        protocol_id: "moonwell".into(),
        pool_id: "moonwell-pool".into(),
        token: "USDC".into(),
        apy,
        tvl_usd,
        pool: PoolSummary { protocol_id: "moonwell".into(), pool_id: "moonwell-pool".into(), tvl_is_estimate: false },
    }
}

fn default_thresholds() -> ProfitabilityThresholds {
    ProfitabilityThresholds { min_apy_improvement_pp: dec!(0.5), min_annual_gain_usd: dec!(10), max_break_even_days: 30, max_cost_pct: dec!(0.01) }
}

fn strategy(thresholds: ProfitabilityThresholds) -> AggressiveStrategy {
    AggressiveStrategy {
        thresholds,
        portfolio: PortfolioContext {
            active_protocol_count: 1,
            destination_current_usd: Decimal::ZERO,
            total_portfolio_usd: dec!(10_000),
            max_concentration_pct: dec!(0.40),
            large_position_threshold_usd: dec!(50_000),
        },
        allow_high_risk: false,
        is_l2: true,
    }
}

/// Scenario 1: base L2 cheap move, $200 at 3.46% -> 5.23%. Under the
/// default $10 minimum annual-gain gate the ~$3.54 net gain fails, so
/// no recommendation is produced; lowering the threshold to $3 admits
/// it.
#[test]
fn base_l2_cheap_move_is_gated_by_min_annual_gain() {
    let position = position(dec!(3.46), dec!(200));
    let target = target(dec!(5.23), dec!(60_000_000));

    let strict = strategy(default_thresholds());
    assert!(strict.analyze(&[position.clone()], &[target.clone()]).is_empty());

    let mut loosened = default_thresholds();
    loosened.min_annual_gain_usd = dec!(3);
    let lenient = strategy(loosened);
    let recs = lenient.analyze(&[position], &[target]);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].profitability.is_profitable);
}

/// Scenario 2: dust move, $100 at 5% -> 7%, net gain ~$1.92 — rejected
/// under the default $10 gate regardless of threshold tweaks this
/// small.
#[test]
fn dust_move_never_clears_the_annual_gain_gate() {
    let position = position(dec!(5), dec!(100));
    let target = target(dec!(7), dec!(60_000_000));
    let strategy = strategy(default_thresholds());
    assert!(strategy.analyze(&[position], &[target]).is_empty());
}

/// Scenario 3: slippage kill. A $2000 swap-requiring move into a
/// shallow pool racks up enough slippage cost to blow the break-even
/// gate even though the raw APY delta and dollar gain look fine.
#[test]
fn thin_pool_slippage_kills_an_otherwise_attractive_move() {
    let position = Position { token: "WETH".into(), ..position(dec!(6), dec!(2000)) };
    let target = target(dec!(6.8), dec!(40_000)); // shallow pool -> high slippage bps
    let strategy = strategy(default_thresholds());
    let recs = strategy.analyze(&[position], &[target]);
    assert!(recs.is_empty(), "a swap into a shallow pool should blow the break-even gate");
}
