//! Profitability Engine (spec §4.6, component C6).
//!
//! Pure function of its inputs — no I/O, no suspension (spec §5: "pure
//! math ... does not suspend"). Grounded on the same decimal-gate style
//! as [`crate::wallet::limits`], generalized from a single boolean cap
//! to four independent accumulating gates.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct ProfitabilityParams {
    pub current_apy: Decimal,
    pub target_apy: Decimal,
    pub size_usd: Decimal,
    pub requires_swap: bool,
    pub protocol_fee_pct: Decimal,
    pub is_l2: bool,
    /// `None` when the wallet's live estimate is unavailable; falls
    /// back to the network-aware constant (spec §4.6).
    pub gas_price_gwei: Option<Decimal>,
    pub pool_depth_usd: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ProfitabilityThresholds {
    pub min_apy_improvement_pp: Decimal,
    pub min_annual_gain_usd: Decimal,
    pub max_break_even_days: u32,
    pub max_cost_pct: Decimal,
}

#[derive(Debug, Clone)]
pub struct MoveProfitability {
    pub gate_apy_improvement: bool,
    pub gate_annual_gain: bool,
    pub gate_break_even: bool,
    pub gate_cost_ratio: bool,
    pub gross_annual_gain: Decimal,
    pub total_cost_usd: Decimal,
    pub net_first_year_usd: Decimal,
    /// `None` represents the spec's "else infinite" break-even case.
    pub break_even_days: Option<u32>,
    pub roi_on_cost_pct: Decimal,
    pub rejection_reasons: Vec<String>,
    pub is_profitable: bool,
}

const FALLBACK_L2_GWEI: Decimal = dec!(0.01);
const FALLBACK_L1_GWEI: Decimal = dec!(50);
const DEFAULT_SLIPPAGE_BPS: Decimal = dec!(50);
const OPS_WITHOUT_SWAP: u32 = 3; // withdraw, approve, deposit
const OPS_WITH_SWAP: u32 = 4;
const GAS_UNITS_PER_OP: u64 = 150_000; // typical ERC-20 approve/deposit/withdraw call

pub fn evaluate(params: &ProfitabilityParams, thresholds: &ProfitabilityThresholds) -> MoveProfitability {
    let ops = if params.requires_swap { OPS_WITH_SWAP } else { OPS_WITHOUT_SWAP };
    let gas_price_gwei = params
        .gas_price_gwei
        .unwrap_or(if params.is_l2 { FALLBACK_L2_GWEI } else { FALLBACK_L1_GWEI });
    let gas_cost_usd = estimate_gas_cost_usd(ops, gas_price_gwei);

    let slippage_cost_usd = if params.requires_swap {
        let bps = params
            .pool_depth_usd
            .filter(|d| !d.is_zero())
            .map(|depth| slippage_bps_from_depth(params.size_usd, depth))
            .unwrap_or(DEFAULT_SLIPPAGE_BPS);
        crate::money::apply_bps(params.size_usd, bps)
    } else {
        Decimal::ZERO
    };

    let protocol_fee_cost_usd = crate::money::apply_bps(params.size_usd, params.protocol_fee_pct * dec!(100));

    let total_cost_usd = gas_cost_usd + slippage_cost_usd + protocol_fee_cost_usd;

    let apy_delta = params.target_apy - params.current_apy;
    let gross_annual_gain = apy_delta / dec!(100) * params.size_usd;
    let net_first_year_usd = gross_annual_gain - total_cost_usd;

    let break_even_days = if gross_annual_gain > Decimal::ZERO {
        let days = (total_cost_usd * dec!(365) / gross_annual_gain).ceil();
        days.to_u32()
    } else {
        None
    };

    let cost_pct = if params.size_usd.is_zero() { Decimal::ZERO } else { total_cost_usd / params.size_usd };
    let roi_on_cost_pct = if total_cost_usd.is_zero() {
        Decimal::ZERO
    } else {
        net_first_year_usd / total_cost_usd * dec!(100)
    };

    let mut reasons = Vec::new();

    let gate_apy_improvement = apy_delta >= thresholds.min_apy_improvement_pp;
    if !gate_apy_improvement {
        reasons.push(format!(
            "apy improvement {apy_delta} below minimum {}",
            thresholds.min_apy_improvement_pp
        ));
    }

    let gate_annual_gain = net_first_year_usd >= thresholds.min_annual_gain_usd;
    if !gate_annual_gain {
        reasons.push(format!(
            "net first-year gain {net_first_year_usd} below minimum {}",
            thresholds.min_annual_gain_usd
        ));
    }

    let gate_break_even = match break_even_days {
        Some(days) => days <= thresholds.max_break_even_days,
        None => false,
    };
    if !gate_break_even {
        reasons.push(match break_even_days {
            Some(days) => format!("break-even {days}d exceeds maximum {}d", thresholds.max_break_even_days),
            None => "break-even is infinite (no positive gain)".to_string(),
        });
    }

    let gate_cost_ratio = cost_pct <= thresholds.max_cost_pct;
    if !gate_cost_ratio {
        reasons.push(format!("cost ratio {cost_pct} exceeds maximum {}", thresholds.max_cost_pct));
    }

    let is_profitable = reasons.is_empty();

    MoveProfitability {
        gate_apy_improvement,
        gate_annual_gain,
        gate_break_even,
        gate_cost_ratio,
        gross_annual_gain,
        total_cost_usd,
        net_first_year_usd,
        break_even_days,
        roi_on_cost_pct,
        rejection_reasons: reasons,
        is_profitable,
    }
}

fn estimate_gas_cost_usd(ops: u32, gas_price_gwei: Decimal) -> Decimal {
    let gas_units = Decimal::from(GAS_UNITS_PER_OP) * Decimal::from(ops);
    let native_price_usd = dec!(3000); // ETH-denominated L2 gas, matches oracle mock default
    let wei_cost = gas_units * gas_price_gwei * dec!(1_000_000_000);
    let eth_cost = wei_cost / Decimal::from(10u64).powi(18);
    eth_cost * native_price_usd
}

fn slippage_bps_from_depth(size_usd: Decimal, pool_depth_usd: Decimal) -> Decimal {
    // A simple constant-product-style impact proxy: impact scales with
    // the trade's share of pool depth. Capped at 500 bps (5%) since
    // beyond that the move wouldn't be proposed in the first place.
    let share = size_usd / pool_depth_usd;
    (share * dec!(10_000)).min(dec!(500)).max(DEFAULT_SLIPPAGE_BPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ProfitabilityThresholds {
        ProfitabilityThresholds {
            min_apy_improvement_pp: dec!(0.5),
            min_annual_gain_usd: dec!(10),
            max_break_even_days: 30,
            max_cost_pct: dec!(0.01),
        }
    }

    #[test]
    fn boundary_net_first_year_equal_to_minimum_passes() {
        let params = ProfitabilityParams {
            current_apy: dec!(5),
            target_apy: dec!(10),
            size_usd: dec!(1000),
            requires_swap: false,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: true,
            gas_price_gwei: Some(Decimal::ZERO),
            pool_depth_usd: None,
        };
        let result = evaluate(&params, &defaults());
        // gross_annual = 5%/100*1000 = 50, cost 0 => net = 50 >= 10.
        assert!(result.gate_annual_gain);
    }

    #[test]
    fn dust_move_fails_annual_gain_gate() {
        let params = ProfitabilityParams {
            current_apy: dec!(5.0),
            target_apy: dec!(7.0),
            size_usd: dec!(100),
            requires_swap: false,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: true,
            gas_price_gwei: Some(dec!(0.01)),
            pool_depth_usd: None,
        };
        let result = evaluate(&params, &defaults());
        assert!(!result.gate_annual_gain);
        assert!(!result.is_profitable);
    }

    #[test]
    fn slippage_kill_fails_break_even_gate() {
        let params = ProfitabilityParams {
            current_apy: dec!(6.0),
            target_apy: dec!(6.8),
            size_usd: dec!(2000),
            requires_swap: true,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: true,
            gas_price_gwei: Some(dec!(0.01)),
            pool_depth_usd: None,
        };
        let result = evaluate(&params, &defaults());
        assert!(result.break_even_days.unwrap_or(0) > defaults().max_break_even_days);
        assert!(!result.is_profitable);
    }

    #[test]
    fn pure_function_same_inputs_same_output() {
        let params = ProfitabilityParams {
            current_apy: dec!(3.46),
            target_apy: dec!(5.23),
            size_usd: dec!(200),
            requires_swap: false,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: true,
            gas_price_gwei: Some(dec!(0.01)),
            pool_depth_usd: None,
        };
        let a = evaluate(&params, &defaults());
        let b = evaluate(&params, &defaults());
        assert_eq!(a.net_first_year_usd, b.net_first_year_usd);
        assert_eq!(a.is_profitable, b.is_profitable);
    }

    #[test]
    fn zero_gross_gain_has_infinite_break_even() {
        let params = ProfitabilityParams {
            current_apy: dec!(5),
            target_apy: dec!(5),
            size_usd: dec!(1000),
            requires_swap: false,
            protocol_fee_pct: Decimal::ZERO,
            is_l2: true,
            gas_price_gwei: Some(dec!(0.01)),
            pool_depth_usd: None,
        };
        let result = evaluate(&params, &defaults());
        assert!(result.break_even_days.is_none());
        assert!(!result.gate_break_even);
    }
}
