//! Strategy (spec §4.8, component C8).

pub mod aggressive;
pub mod risk_adjusted;

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::model::{Position, RebalanceRecommendation};
use crate::risk::DestinationProfile;
use crate::scanner::YieldOpportunity;

/// Shared contract over the two strategy variants. Both map the same
/// positions + yields input to recommendations; only the selection and
/// allocation policy differs.
pub trait Strategy {
    fn analyze(&self, positions: &[Position], opportunities: &[YieldOpportunity]) -> Vec<RebalanceRecommendation>;
    fn allocate(&self, new_capital_usd: Decimal, opportunities: &[YieldOpportunity]) -> HashMap<String, Decimal>;
}

/// Static per-protocol safety score (0-100, higher = safer), used to
/// seed [`DestinationProfile`] for the risk engine. Real deployments
/// would source this from an audited-protocol registry; the adapters
/// themselves have no "safety" field to read from chain.
pub fn protocol_safety_score(protocol_id: &str) -> u32 {
    match protocol_id {
        "aave" => 90,
        "moonwell" => 70,
        "aerodrome" => 60,
        _ => 50,
    }
}

/// Builds a [`DestinationProfile`] from an opportunity. Utilization
/// isn't part of [`YieldOpportunity`]'s normalized shape, so it's
/// assumed mid-range (50%) absent a live read — acceptable for the
/// risk engine since utilization only contributes up to 30 of the
/// composite 0-255 scale.
pub fn destination_profile(opportunity: &YieldOpportunity) -> DestinationProfile {
    DestinationProfile {
        protocol_safety_score: protocol_safety_score(&opportunity.protocol_id),
        tvl_usd: opportunity.tvl_usd,
        utilization_pct: rust_decimal_macros::dec!(50),
    }
}
