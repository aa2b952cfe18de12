//! Scheduler / Orchestrator (spec §4.10, component C10).
//!
//! Grounded on `run/mod.rs`'s daemon-mode tick loop — a `loop { ...
//! tick ...}` that re-saves state every pass — generalized from cron
//! trigger evaluation to a fixed scan interval, and from
//! `println!`/`RunState::save` to `tracing` + [`crate::persistence::Store`].
//! Cancellation is cooperative: [`Scheduler::run`] selects between the
//! tick timer and a `CancellationToken`-style `tokio::sync::watch`, so a
//! shutdown request never lands mid-tick with half-recorded decisions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::MammonConfig;
use crate::error::Result;
use crate::executor::RebalanceExecutor;
use crate::model::Position;
use crate::oracle::PriceOracle;
use crate::persistence::{DecisionRecord, Store};
use crate::risk::PortfolioContext;
use crate::scanner::YieldScanner;
use crate::strategy::aggressive::AggressiveStrategy;
use crate::strategy::risk_adjusted::RiskAdjustedStrategy;
use crate::strategy::Strategy;
use crate::venues::{Adapter, VenueAdapter};
use crate::wallet::Wallet;

pub struct TickSummary {
    pub opportunities_found: usize,
    pub recommendations_considered: usize,
    pub rebalances_executed: usize,
    pub errors: Vec<String>,
}

pub struct Scheduler {
    config: MammonConfig,
    adapters: Vec<Arc<Adapter>>,
    wallet: Arc<Wallet>,
    oracle: Arc<PriceOracle>,
    store: Arc<Store>,
    sink: Arc<dyn crate::audit::AuditSink>,
    shutdown: tokio::sync::watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: MammonConfig,
        adapters: Vec<Arc<Adapter>>,
        wallet: Arc<Wallet>,
        oracle: Arc<PriceOracle>,
        store: Arc<Store>,
        sink: Arc<dyn crate::audit::AuditSink>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Scheduler { config, adapters, wallet, oracle, store, sink, shutdown }
    }

    /// Runs ticks on `scan_interval_seconds` cadence until the shutdown
    /// channel flips to `true`. Cancellation is only observed between
    /// ticks, never inside one, so a tick always finishes recording
    /// whatever decisions it made.
    pub async fn run(&mut self) {
        let interval = Duration::from_secs(self.config.scan_interval_seconds);
        loop {
            if *self.shutdown.borrow() {
                info!("scheduler shutdown requested, exiting before next tick");
                return;
            }

            match self.tick().await {
                Ok(summary) => info!(
                    opportunities = summary.opportunities_found,
                    considered = summary.recommendations_considered,
                    executed = summary.rebalances_executed,
                    errors = summary.errors.len(),
                    "tick complete"
                ),
                Err(e) => error!(error = %e, "tick failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("scheduler shutdown requested during sleep");
                        return;
                    }
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        let scanner = YieldScanner::new(self.adapters.clone(), self.config.min_pool_tvl_usd);
        let opportunities = scanner.scan_all().await?;

        let positions = self.positions_including_idle_capital().await;
        let portfolio = self.portfolio_context(&positions);

        let recommendations = if self.config.allow_high_risk {
            AggressiveStrategy {
                thresholds: self.thresholds(),
                portfolio: portfolio.clone(),
                allow_high_risk: true,
                is_l2: true,
            }
            .analyze(&positions, &opportunities)
        } else {
            RiskAdjustedStrategy {
                thresholds: self.thresholds(),
                portfolio: portfolio.clone(),
                is_l2: true,
                diversification_count: self.config.diversification_target_k,
                per_protocol_cap_pct: self.config.max_concentration_pct,
            }
            .analyze(&positions, &opportunities)
        };

        let mut errors = Vec::new();
        let mut executed = 0usize;
        let executor = RebalanceExecutor::new(self.wallet.clone(), self.sink.clone());

        for recommendation in recommendations.iter().take(self.config.max_rebalances_per_tick) {
            let source = recommendation
                .source_protocol
                .as_deref()
                .and_then(|id| self.adapters.iter().find(|a| a.protocol_id() == id));
            let Some(destination) = self.adapters.iter().find(|a| a.protocol_id() == recommendation.destination_protocol) else {
                errors.push(format!("unknown destination protocol '{}'", recommendation.destination_protocol));
                continue;
            };

            match executor.execute(recommendation, source.map(|a| a.as_ref()), destination).await {
                Ok(_) => {
                    executed += 1;
                    let _ = self.store.record_decision(&DecisionRecord::from_recommendation(recommendation, true));
                }
                Err(e) => {
                    warn!(error = %e, destination = %recommendation.destination_protocol, "rebalance failed");
                    let _ = self.store.record_decision(&DecisionRecord::from_recommendation(recommendation, false));
                    errors.push(e.to_string());
                }
            }
        }

        Ok(TickSummary {
            opportunities_found: opportunities.len(),
            recommendations_considered: recommendations.len(),
            rebalances_executed: executed,
            errors,
        })
    }

    /// Active positions plus one synthetic zero-APY "position" per token
    /// the wallet is holding idle (not already backing an active
    /// position) — matches spec §4.10's idle-capital detection step, so
    /// the strategy can treat a dormant wallet balance the same as a
    /// position earning nothing.
    async fn positions_including_idle_capital(&self) -> Vec<Position> {
        let mut positions = self.store.active_positions();
        let held_tokens: std::collections::HashSet<String> = positions.iter().map(|p| p.token.clone()).collect();

        for token in ["USDC", "WETH", "DAI"] {
            if held_tokens.contains(token) {
                continue;
            }
            let Ok(balance) = self.wallet.balance(token).await else { continue };
            let Ok(price) = self.oracle.get_price(token).await else { continue };
            let usd_value = balance * price;
            if usd_value <= self.config.min_rebalance_amount_usd {
                continue;
            }
            positions.push(Position {
                wallet_address: format!("{:#x}", self.wallet.address()),
                protocol_id: "idle".to_string(),
                pool_id: format!("idle-{token}"),
                token: token.to_string(),
                amount: balance,
                usd_value_snapshot: usd_value,
                entry_apy: rust_decimal::Decimal::ZERO,
                current_apy: rust_decimal::Decimal::ZERO,
                opened_at: chrono::Utc::now(),
                closed_at: None,
                status: crate::model::PositionStatus::Active,
            });
        }
        positions
    }

    fn portfolio_context(&self, positions: &[Position]) -> PortfolioContext {
        let total: rust_decimal::Decimal = positions.iter().map(|p| p.usd_value_snapshot).sum();
        let protocols: std::collections::HashSet<&str> = positions.iter().map(|p| p.protocol_id.as_str()).collect();
        PortfolioContext {
            active_protocol_count: protocols.len() as u32,
            destination_current_usd: rust_decimal::Decimal::ZERO,
            total_portfolio_usd: total,
            max_concentration_pct: self.config.max_concentration_pct,
            large_position_threshold_usd: self.config.large_position_threshold_usd,
        }
    }

    fn thresholds(&self) -> crate::profitability::ProfitabilityThresholds {
        crate::profitability::ProfitabilityThresholds {
            min_apy_improvement_pp: self.config.min_apy_improvement_pp,
            min_annual_gain_usd: self.config.min_annual_gain_usd,
            max_break_even_days: self.config.max_break_even_days,
            max_cost_pct: self.config.max_cost_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_summary_reports_zero_when_no_opportunities() {
        let summary = TickSummary { opportunities_found: 0, recommendations_considered: 0, rebalances_executed: 0, errors: vec![] };
        assert_eq!(summary.opportunities_found, 0);
        assert!(summary.errors.is_empty());
    }
}
