//! Aggressive strategy (spec §4.8): highest-APY alternative per
//! position, 100% of new capital to the single best opportunity.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::model::{confidence_score, Position, RebalanceRecommendation};
use crate::profitability::{self, ProfitabilityParams, ProfitabilityThresholds};
use crate::risk::{self, PortfolioContext};
use crate::scanner::YieldOpportunity;
use super::{destination_profile, Strategy};

pub struct AggressiveStrategy {
    pub thresholds: ProfitabilityThresholds,
    pub portfolio: PortfolioContext,
    pub allow_high_risk: bool,
    pub is_l2: bool,
}

impl Strategy for AggressiveStrategy {
    fn analyze(&self, positions: &[Position], opportunities: &[YieldOpportunity]) -> Vec<RebalanceRecommendation> {
        let mut recommendations = Vec::new();
        for position in positions.iter().filter(|p| p.status == crate::model::PositionStatus::Active) {
            let best = opportunities
                .iter()
                .filter(|o| o.token == position.token && o.pool_id != position.pool_id)
                .max_by(|a, b| a.apy.cmp(&b.apy));
            let Some(best) = best else { continue };
            if best.apy <= position.current_apy {
                continue;
            }
            if let Some(rec) = self.build_recommendation(Some(position), best) {
                recommendations.push(rec);
            }
        }
        recommendations
    }

    fn allocate(&self, new_capital_usd: Decimal, opportunities: &[YieldOpportunity]) -> HashMap<String, Decimal> {
        let mut allocation = HashMap::new();
        if let Some(best) = opportunities.iter().max_by(|a, b| a.apy.cmp(&b.apy)) {
            allocation.insert(best.protocol_id.clone(), new_capital_usd);
        }
        allocation
    }
}

impl AggressiveStrategy {
    fn build_recommendation(&self, position: Option<&Position>, target: &YieldOpportunity) -> Option<RebalanceRecommendation> {
        let current_apy = position.map(|p| p.current_apy).unwrap_or(Decimal::ZERO);
        let size_usd = position.map(|p| p.usd_value_snapshot).unwrap_or(Decimal::ZERO);
        let requires_swap = position.map(|p| p.token != target.token).unwrap_or(false);

        let params = ProfitabilityParams {
            current_apy,
            target_apy: target.apy,
            size_usd,
            requires_swap,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: self.is_l2,
            gas_price_gwei: None,
            pool_depth_usd: Some(target.tvl_usd),
        };
        let profitability = profitability::evaluate(&params, &self.thresholds);
        if !profitability.is_profitable {
            return None;
        }

        let assessment = risk::assess_rebalance(&destination_profile(target), size_usd, requires_swap, &self.portfolio);
        if !risk::passes_gate(&assessment, self.allow_high_risk) {
            return None;
        }

        let confidence = confidence_score(target.apy - current_apy, assessment.composite_score, profitability.break_even_days);

        Some(RebalanceRecommendation {
            source_protocol: position.map(|p| p.protocol_id.clone()),
            source_pool: position.map(|p| p.pool_id.clone()),
            destination_protocol: target.protocol_id.clone(),
            destination_pool: target.pool_id.clone(),
            token_in: position.map(|p| p.token.clone()).unwrap_or_else(|| target.token.clone()),
            token_out: target.token.clone(),
            amount_usd: size_usd,
            expected_apy: target.apy,
            confidence,
            reason: format!("aggressive: {} offers {}% APY", target.protocol_id, target.apy),
            profitability,
            risk: assessment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn thresholds() -> ProfitabilityThresholds {
        ProfitabilityThresholds {
            min_apy_improvement_pp: dec!(0.5),
            min_annual_gain_usd: dec!(10),
            max_break_even_days: 30,
            max_cost_pct: dec!(0.01),
        }
    }

    fn portfolio() -> PortfolioContext {
        PortfolioContext {
            active_protocol_count: 1,
            destination_current_usd: Decimal::ZERO,
            total_portfolio_usd: dec!(10000),
            max_concentration_pct: dec!(0.40),
            large_position_threshold_usd: dec!(50000),
        }
    }

    fn strategy() -> AggressiveStrategy {
        AggressiveStrategy { thresholds: thresholds(), portfolio: portfolio(), allow_high_risk: false, is_l2: true }
    }

    fn opp(protocol: &str, apy: Decimal) -> YieldOpportunity {
        YieldOpportunity {
            protocol_id: protocol.to_string(),
            pool_id: format!("{protocol}-pool"),
            token: "USDC".to_string(),
            apy,
            tvl_usd: dec!(60_000_000),
            pool: crate::scanner::PoolSummary {
                protocol_id: protocol.to_string(),
                pool_id: format!("{protocol}-pool"),
                tvl_is_estimate: false,
            },
        }
    }

    #[test]
    fn allocates_all_new_capital_to_best_opportunity() {
        let strategy = strategy();
        let opportunities = vec![opp("aave", dec!(8)), opp("moonwell", dec!(7)), opp("aerodrome", dec!(12))];
        let allocation = strategy.allocate(dec!(10000), &opportunities);
        assert_eq!(allocation.len(), 1);
        assert_eq!(allocation.get("aerodrome"), Some(&dec!(10000)));
    }

    #[test]
    fn recommends_move_when_target_beats_current_position() {
        let strategy = strategy();
        let position = Position {
            wallet_address: "0xabc".into(),
            protocol_id: "moonwell".into(),
            pool_id: "moonwell-pool".into(),
            token: "USDC".into(),
            amount: dec!(5000),
            usd_value_snapshot: dec!(5000),
            entry_apy: dec!(3),
            current_apy: dec!(3),
            opened_at: Utc::now(),
            closed_at: None,
            status: crate::model::PositionStatus::Active,
        };
        let opportunities = vec![opp("aave", dec!(9))];
        let recs = strategy.analyze(&[position], &opportunities);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].destination_protocol, "aave");
    }
}
