//! Risk Engine (spec §4.7, component C7).
//!
//! Pure function like [`crate::profitability`]; the composite score is
//! a sum of seven bounded, independently-computed factors.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct PortfolioContext {
    pub active_protocol_count: u32,
    pub destination_current_usd: Decimal,
    pub total_portfolio_usd: Decimal,
    pub max_concentration_pct: Decimal,
    pub large_position_threshold_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct DestinationProfile {
    pub protocol_safety_score: u32, // 0-100, higher = safer
    pub tvl_usd: Decimal,
    pub utilization_pct: Decimal, // 0-100
}

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub protocol_risk: u32,
    pub tvl_adequacy: u32,
    pub utilization: u32,
    pub position_size: u32,
    pub swap_requirement: u32,
    pub concentration: u32,
    pub diversification: u32,
    pub composite_score: u32,
    pub level: RiskLevel,
    pub recommendation: String,
}

pub fn assess_rebalance(
    destination: &DestinationProfile,
    amount_usd: Decimal,
    requires_swap: bool,
    portfolio: &PortfolioContext,
) -> RiskAssessment {
    let protocol_risk = (100u32.saturating_sub(destination.protocol_safety_score) * 40 / 100).min(40);

    let tvl_adequacy = tvl_band_score(destination.tvl_usd);
    let utilization = utilization_score(destination.utilization_pct);
    let position_size = position_size_score(amount_usd, portfolio.large_position_threshold_usd);
    let swap_requirement = if requires_swap { 20 } else { 5 };
    let concentration = concentration_score(
        portfolio.destination_current_usd + amount_usd,
        portfolio.total_portfolio_usd.max(amount_usd),
        portfolio.max_concentration_pct,
    );
    let diversification = diversification_score(portfolio.active_protocol_count);

    let composite_score = (protocol_risk
        + tvl_adequacy
        + utilization
        + position_size
        + swap_requirement
        + concentration
        + diversification)
        .min(255);

    let level = level_for(composite_score);
    let recommendation = match level {
        RiskLevel::Low => "proceed".to_string(),
        RiskLevel::Medium => "proceed with standard monitoring".to_string(),
        RiskLevel::High => "proceed only if high-risk moves are explicitly permitted".to_string(),
        RiskLevel::Critical => "reject".to_string(),
    };

    RiskAssessment {
        protocol_risk,
        tvl_adequacy,
        utilization,
        position_size,
        swap_requirement,
        concentration,
        diversification,
        composite_score,
        level,
        recommendation,
    }
}

/// Whether a move with this assessment may proceed, given the caller's
/// high-risk permission (spec §4.7: "Low/Medium, or High and the
/// caller explicitly permits High").
pub fn passes_gate(assessment: &RiskAssessment, allow_high_risk: bool) -> bool {
    match assessment.level {
        RiskLevel::Low | RiskLevel::Medium => true,
        RiskLevel::High => allow_high_risk,
        RiskLevel::Critical => false,
    }
}

fn level_for(score: u32) -> RiskLevel {
    if score <= 25 {
        RiskLevel::Low
    } else if score <= 50 {
        RiskLevel::Medium
    } else if score <= 75 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

fn tvl_band_score(tvl_usd: Decimal) -> u32 {
    if tvl_usd >= dec!(50_000_000) {
        0
    } else if tvl_usd >= dec!(10_000_000) {
        10
    } else if tvl_usd >= dec!(1_000_000) {
        20
    } else {
        30
    }
}

fn utilization_score(utilization_pct: Decimal) -> u32 {
    if utilization_pct >= dec!(95) {
        30
    } else if utilization_pct >= dec!(85) {
        20
    } else if utilization_pct >= dec!(70) {
        10
    } else {
        0
    }
}

/// Log-scaled relative to the large-position threshold (spec §4.7).
fn position_size_score(amount_usd: Decimal, large_position_threshold_usd: Decimal) -> u32 {
    if large_position_threshold_usd.is_zero() || amount_usd <= Decimal::ZERO {
        return 0;
    }
    let ratio: f64 = (amount_usd / large_position_threshold_usd).to_f64().unwrap_or(0.0);
    if ratio <= 0.0 {
        return 0;
    }
    let scaled = (ratio.ln().max(0.0) * 10.0).round();
    (scaled as u32).min(30)
}

fn concentration_score(post_move_usd: Decimal, total_usd: Decimal, cap_pct: Decimal) -> u32 {
    if total_usd.is_zero() {
        return 0;
    }
    let share = post_move_usd / total_usd;
    if share <= cap_pct {
        0
    } else {
        let overshoot: f64 = ((share - cap_pct) / cap_pct).to_f64().unwrap_or(0.0);
        ((overshoot * 50.0).round() as u32).min(50)
    }
}

fn diversification_score(active_protocol_count: u32) -> u32 {
    match active_protocol_count {
        0 => 20,
        1 => 15,
        2 => 10,
        3 => 5,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe_destination() -> DestinationProfile {
        DestinationProfile { protocol_safety_score: 90, tvl_usd: dec!(60_000_000), utilization_pct: dec!(50) }
    }

    fn portfolio() -> PortfolioContext {
        PortfolioContext {
            active_protocol_count: 3,
            destination_current_usd: Decimal::ZERO,
            total_portfolio_usd: dec!(100_000),
            max_concentration_pct: dec!(0.40),
            large_position_threshold_usd: dec!(50_000),
        }
    }

    #[test]
    fn low_risk_move_is_low_level() {
        let assessment = assess_rebalance(&safe_destination(), dec!(1000), false, &portfolio());
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(passes_gate(&assessment, false));
    }

    #[test]
    fn high_risk_requires_explicit_permission() {
        let risky = DestinationProfile { protocol_safety_score: 20, tvl_usd: dec!(100_000), utilization_pct: dec!(96) };
        let assessment = assess_rebalance(&risky, dec!(60_000), true, &portfolio());
        if assessment.level == RiskLevel::High {
            assert!(!passes_gate(&assessment, false));
            assert!(passes_gate(&assessment, true));
        }
    }

    #[test]
    fn critical_never_passes_even_with_permission() {
        let very_risky = DestinationProfile { protocol_safety_score: 0, tvl_usd: dec!(10_000), utilization_pct: dec!(99) };
        let mut ctx = portfolio();
        ctx.destination_current_usd = dec!(90_000);
        let assessment = assess_rebalance(&very_risky, dec!(100_000), true, &ctx);
        if assessment.level == RiskLevel::Critical {
            assert!(!passes_gate(&assessment, true));
        }
    }

    #[test]
    fn pure_function_repeated_calls_match() {
        let a = assess_rebalance(&safe_destination(), dec!(1000), false, &portfolio());
        let b = assess_rebalance(&safe_destination(), dec!(1000), false, &portfolio());
        assert_eq!(a.composite_score, b.composite_score);
    }
}
