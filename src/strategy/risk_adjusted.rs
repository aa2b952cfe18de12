//! Risk-adjusted strategy (spec §4.8): same profitability/risk gating
//! as the aggressive variant, but new capital is diversified across the
//! top-*k* opportunities weighted by APY, capped per protocol.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::model::{confidence_score, Position, RebalanceRecommendation};
use crate::profitability::{self, ProfitabilityParams, ProfitabilityThresholds};
use crate::risk::{self, PortfolioContext};
use crate::scanner::YieldOpportunity;
use super::{destination_profile, Strategy};

pub struct RiskAdjustedStrategy {
    pub thresholds: ProfitabilityThresholds,
    pub portfolio: PortfolioContext,
    pub is_l2: bool,
    /// How many of the top opportunities to spread new capital across.
    pub diversification_count: usize,
    /// Maximum share of new capital any single protocol may receive.
    pub per_protocol_cap_pct: Decimal,
}

impl Default for RiskAdjustedStrategy {
    fn default() -> Self {
        RiskAdjustedStrategy {
            thresholds: ProfitabilityThresholds {
                min_apy_improvement_pp: dec!(0.5),
                min_annual_gain_usd: dec!(10),
                max_break_even_days: 30,
                max_cost_pct: dec!(0.01),
            },
            portfolio: PortfolioContext {
                active_protocol_count: 0,
                destination_current_usd: Decimal::ZERO,
                total_portfolio_usd: Decimal::ZERO,
                max_concentration_pct: dec!(0.40),
                large_position_threshold_usd: dec!(50000),
            },
            is_l2: true,
            diversification_count: 3,
            per_protocol_cap_pct: dec!(0.40),
        }
    }
}

impl Strategy for RiskAdjustedStrategy {
    fn analyze(&self, positions: &[Position], opportunities: &[YieldOpportunity]) -> Vec<RebalanceRecommendation> {
        let mut recommendations = Vec::new();
        for position in positions.iter().filter(|p| p.status == crate::model::PositionStatus::Active) {
            // Only ever move into something that also clears the risk
            // gate — "high risk but high APY" is exactly what this
            // variant refuses to chase.
            let candidate = opportunities
                .iter()
                .filter(|o| o.token == position.token && o.pool_id != position.pool_id && o.apy > position.current_apy)
                .max_by(|a, b| a.apy.cmp(&b.apy));
            let Some(candidate) = candidate else { continue };
            if let Some(rec) = self.build_recommendation(Some(position), candidate) {
                recommendations.push(rec);
            }
        }
        recommendations
    }

    fn allocate(&self, new_capital_usd: Decimal, opportunities: &[YieldOpportunity]) -> HashMap<String, Decimal> {
        let cap = new_capital_usd * self.per_protocol_cap_pct;
        // Gate each candidate against the share it could actually end up
        // with (the per-protocol cap), against the portfolio as it will
        // look once this capital lands — not the full new_capital_usd
        // against the pre-move portfolio, which would price every
        // candidate as 100% concentrated whenever the wallet is
        // deploying its first capital.
        let post_deploy_portfolio =
            PortfolioContext { total_portfolio_usd: self.portfolio.total_portfolio_usd + new_capital_usd, ..self.portfolio.clone() };
        let safe: Vec<&YieldOpportunity> = opportunities
            .iter()
            .filter(|o| {
                let assessment = risk::assess_rebalance(&destination_profile(o), cap, false, &post_deploy_portfolio);
                risk::passes_gate(&assessment, false)
            })
            .take(self.diversification_count)
            .collect();

        if safe.is_empty() {
            return HashMap::new();
        }

        let total_apy: Decimal = safe.iter().map(|o| o.apy).sum();
        if total_apy <= Decimal::ZERO {
            // Degenerate case: split evenly rather than divide by zero.
            let mut allocation = HashMap::new();
            let share = new_capital_usd / Decimal::from(safe.len() as u64);
            for o in &safe {
                allocation.insert(o.protocol_id.clone(), share);
            }
            return allocation;
        }

        // Waterfill: weight remaining capital by APY among protocols not
        // yet at their cap, and hand capital a capped protocol can't
        // absorb to whichever protocols still have headroom, instead of
        // leaving it stranded after a single weighted pass.
        let mut allocation: HashMap<String, Decimal> = HashMap::new();
        let mut open: Vec<&YieldOpportunity> = safe;
        let mut remaining = new_capital_usd;

        while remaining > Decimal::ZERO && !open.is_empty() {
            let round_apy: Decimal = open.iter().map(|o| o.apy).sum();
            if round_apy <= Decimal::ZERO {
                break;
            }

            let mut still_open = Vec::new();
            let mut placed_this_round = Decimal::ZERO;
            for o in &open {
                let weight = o.apy / round_apy;
                let tentative = remaining * weight;
                let already = *allocation.get(&o.protocol_id).unwrap_or(&Decimal::ZERO);
                let headroom = cap - already;
                if tentative >= headroom {
                    *allocation.entry(o.protocol_id.clone()).or_insert(Decimal::ZERO) += headroom;
                    placed_this_round += headroom;
                } else {
                    *allocation.entry(o.protocol_id.clone()).or_insert(Decimal::ZERO) += tentative;
                    placed_this_round += tentative;
                    still_open.push(*o);
                }
            }
            if placed_this_round <= Decimal::ZERO {
                break;
            }
            remaining -= placed_this_round;
            open = still_open;
        }
        allocation
    }
}

impl RiskAdjustedStrategy {
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
        if !risk::passes_gate(&assessment, false) {
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
            reason: format!("risk-adjusted: {} clears risk gate at {}% APY", target.protocol_id, target.apy),
            profitability,
            risk: assessment,
        })
    }
}
