//! A recommendation produced by the strategy layer can be persisted as
//! a decision and a position can be upserted/reloaded from the same
//! store — the scheduler's per-tick bookkeeping, exercised end to end
//! instead of through `Store`'s own in-module unit tests.

use chrono::Utc;
use mammon_core::model::{confidence_score, Position, PositionStatus};
use mammon_core::persistence::{DecisionRecord, Store};
use mammon_core::profitability::{self, ProfitabilityParams, ProfitabilityThresholds};
use mammon_core::risk::{self, DestinationProfile, PortfolioContext};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn thresholds() -> ProfitabilityThresholds {
    ProfitabilityThresholds { min_apy_improvement_pp: dec!(0.5), min_annual_gain_usd: dec!(3), max_break_even_days: 30, max_cost_pct: dec!(0.01) }
}

#[test]
fn a_profitable_recommendation_round_trips_through_the_decision_log() {
    let dir = std::env::temp_dir().join(format!("mammon-decision-lifecycle-{}", uuid::Uuid::new_v4()));
    let store = Store::load_or_new(&dir).expect("store should open a fresh directory");

    let params = ProfitabilityParams {
        current_apy: dec!(3.46),
        target_apy: dec!(5.23),
        size_usd: dec!(200),
        requires_swap: false,
        protocol_fee_pct: Decimal::ZERO,
        is_l2: true,
        gas_price_gwei: None,
        pool_depth_usd: None,
    };
    let profitability = profitability::evaluate(&params, &thresholds());
    assert!(profitability.is_profitable, "scenario 1 with a $3 floor should clear every gate");

    let portfolio = PortfolioContext {
        active_protocol_count: 1,
        destination_current_usd: Decimal::ZERO,
        total_portfolio_usd: dec!(200),
        max_concentration_pct: dec!(0.40),
        large_position_threshold_usd: dec!(50_000),
    };
    let destination = DestinationProfile { protocol_safety_score: 90, tvl_usd: dec!(60_000_000), utilization_pct: dec!(50) };
    let assessment = risk::assess_rebalance(&destination, dec!(200), false, &portfolio);
    assert!(risk::passes_gate(&assessment, false));

    let confidence = confidence_score(dec!(5.23) - dec!(3.46), assessment.composite_score, profitability.break_even_days);

    let recommendation = mammon_core::model::RebalanceRecommendation {
        source_protocol: Some("aave".into()),
        source_pool: Some("aave-pool".into()),
        destination_protocol: "moonwell".into(),
        destination_pool: "moonwell-pool".into(),
        token_in: "USDC".into(),
        token_out: "USDC".into(),
        amount_usd: dec!(200),
        expected_apy: dec!(5.23),
        confidence,
        reason: "moonwell offers 5.23% APY".into(),
        profitability,
        risk: assessment,
    };

    store.record_decision(&DecisionRecord::from_recommendation(&recommendation, true)).unwrap();
    let decisions = store.decisions().unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].destination_protocol, "moonwell");
    assert!(decisions[0].executed);

    let position = Position {
        wallet_address: "0xabc".into(),
        protocol_id: recommendation.destination_protocol.clone(),
        pool_id: recommendation.destination_pool.clone(),
        token: recommendation.token_out.clone(),
        amount: recommendation.amount_usd,
        usd_value_snapshot: recommendation.amount_usd,
        entry_apy: recommendation.expected_apy,
        current_apy: recommendation.expected_apy,
        opened_at: Utc::now(),
        closed_at: None,
        status: PositionStatus::Active,
    };
    store.upsert_position(position.clone()).unwrap();

    let reopened = Store::load_or_new(&dir).unwrap();
    assert_eq!(reopened.active_positions().len(), 1);
    assert_eq!(reopened.active_positions()[0].protocol_id, "moonwell");
    // Decisions persist independently of the positions file reload.
    assert_eq!(reopened.decisions().unwrap().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
