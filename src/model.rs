//! Shared data model not owned by a single subsystem (spec §3):
//! `Position` and `RebalanceRecommendation`. Types that belong to one
//! subsystem (`Endpoint`, `PoolInfo`, `ApprovalRequest`, ...) are
//! defined alongside their owning module instead of centralized here,
//! following the teacher's practice of co-locating types with the code
//! that produces them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::profitability::MoveProfitability;
use crate::risk::RiskAssessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub wallet_address: String,
    pub protocol_id: String,
    pub pool_id: String,
    pub token: String,
    pub amount: Decimal,
    pub usd_value_snapshot: Decimal,
    pub entry_apy: Decimal,
    pub current_apy: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: PositionStatus,
}

impl Position {
    pub fn key(&self) -> (String, String, String) {
        (self.wallet_address.clone(), self.protocol_id.clone(), self.pool_id.clone())
    }
}

#[derive(Debug, Clone)]
pub struct RebalanceRecommendation {
    pub source_protocol: Option<String>,
    pub source_pool: Option<String>,
    pub destination_protocol: String,
    pub destination_pool: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_usd: Decimal,
    pub expected_apy: Decimal,
    pub confidence: u32,
    pub reason: String,
    pub profitability: MoveProfitability,
    pub risk: RiskAssessment,
}

/// Confidence is monotone: larger APY delta raises it, higher risk
/// score lowers it, shorter break-even raises it (spec §4.8).
pub fn confidence_score(apy_delta: Decimal, risk_score: u32, break_even_days: Option<u32>) -> u32 {
    use rust_decimal::prelude::ToPrimitive;

    let delta_component = (apy_delta.to_f64().unwrap_or(0.0) * 5.0).clamp(0.0, 40.0);
    let risk_component = (100.0 - risk_score as f64).clamp(0.0, 100.0) * 0.3;
    let break_even_component = match break_even_days {
        Some(days) => (30.0 - days as f64).clamp(0.0, 30.0),
        None => 0.0,
    };
    (delta_component + risk_component + break_even_component).round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn confidence_increases_with_apy_delta() {
        let low = confidence_score(dec!(0.5), 20, Some(10));
        let high = confidence_score(dec!(5), 20, Some(10));
        assert!(high > low);
    }

    #[test]
    fn confidence_decreases_with_risk() {
        let safe = confidence_score(dec!(2), 10, Some(10));
        let risky = confidence_score(dec!(2), 80, Some(10));
        assert!(safe > risky);
    }

    #[test]
    fn confidence_increases_with_shorter_break_even() {
        let fast = confidence_score(dec!(2), 20, Some(2));
        let slow = confidence_score(dec!(2), 20, Some(29));
        assert!(fast > slow);
    }
}
