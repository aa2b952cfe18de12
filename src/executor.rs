//! Rebalance Executor (spec §4.9, component C9).
//!
//! Runs the ordered withdraw → approve → [swap] → deposit pipeline for
//! a [`RebalanceRecommendation`], driving each leg through
//! [`Wallet::execute`] and the source/destination [`VenueAdapter`]s.
//! Grounded on the teacher's `run/` orchestration style: state
//! transitions are explicit and every one is written to the audit
//! sink, so a mid-pipeline failure leaves a legible trail of exactly
//! how far the funds got.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::error::{MammonError, Result};
use crate::model::RebalanceRecommendation;
use crate::venues::{Adapter, VenueAdapter};
use crate::wallet::{ExecuteOptions, Wallet};

/// Pipeline progress, recorded so a crash or an explicit
/// `PartiallyRecovered` error can say exactly what was already done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStep {
    Idle,
    Withdrawn,
    Approved,
    Swapped,
    Deposited,
}

impl ExecutionStep {
    fn label(self) -> &'static str {
        match self {
            ExecutionStep::Idle => "idle",
            ExecutionStep::Withdrawn => "withdrawn",
            ExecutionStep::Approved => "approved",
            ExecutionStep::Swapped => "swapped",
            ExecutionStep::Deposited => "deposited",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub steps_completed: Vec<ExecutionStep>,
    pub deposit_tx_hash: Option<String>,
}

pub struct RebalanceExecutor {
    wallet: Arc<Wallet>,
    sink: Arc<dyn AuditSink>,
}

impl RebalanceExecutor {
    pub fn new(wallet: Arc<Wallet>, sink: Arc<dyn AuditSink>) -> Self {
        RebalanceExecutor { wallet, sink }
    }

    /// Executes one recommendation end to end. `source`/`destination`
    /// are `None` when there is no withdraw leg (new-capital
    /// allocation has nothing to pull out of first).
    pub async fn execute(
        &self,
        recommendation: &RebalanceRecommendation,
        source: Option<&Adapter>,
        destination: &Adapter,
    ) -> Result<ExecutionOutcome> {
        let mut completed = Vec::new();
        let amount = recommendation.amount_usd;

        if let (Some(source), Some(source_pool)) = (source, recommendation.source_pool.as_deref()) {
            self.run_step(ExecutionStep::Withdrawn, &completed, recommendation, || {
                source.build_withdraw(source_pool, &recommendation.token_in, amount)
            })
            .await?;
            completed.push(ExecutionStep::Withdrawn);
        }

        // Approval (ERC-20 allowance) is only meaningful once funds are
        // in hand to move into the destination pool.
        self.run_step(ExecutionStep::Approved, &completed, recommendation, || {
            destination.build_approve(&recommendation.destination_pool, &recommendation.token_out, amount)
        })
        .await?;
        completed.push(ExecutionStep::Approved);

        if recommendation.token_in != recommendation.token_out {
            self.run_swap(&mut completed, recommendation, source, destination, amount).await?;
        }

        let deposit_call = destination
            .build_deposit(&recommendation.destination_pool, &recommendation.token_out, amount)
            .map_err(|e| self.recover_error(&completed, e))?;
        let receipt = self
            .wallet
            .execute(deposit_call, ExecuteOptions { wait_for_confirmation: true, confirmations: 1 })
            .await
            .map_err(|e| self.recover_error(&completed, e))?;
        completed.push(ExecutionStep::Deposited);

        self.sink.record(AuditEvent::new(
            "rebalance_executed",
            Severity::Info,
            "executor",
            format!(
                "moved ${} from {:?}/{:?} to {}/{}",
                amount, recommendation.source_protocol, recommendation.source_pool,
                recommendation.destination_protocol, recommendation.destination_pool
            ),
            json!({ "tx_hash": receipt.tx_hash }),
        ));

        Ok(ExecutionOutcome { steps_completed: completed, deposit_tx_hash: Some(receipt.tx_hash) })
    }

    async fn run_step(
        &self,
        step: ExecutionStep,
        completed: &[ExecutionStep],
        recommendation: &RebalanceRecommendation,
        build: impl FnOnce() -> Result<crate::wallet::TransactionCall>,
    ) -> Result<()> {
        let call = build().map_err(|e| self.recover_error(completed, e))?;
        self.wallet
            .execute(call, ExecuteOptions { wait_for_confirmation: true, confirmations: 1 })
            .await
            .map_err(|e| self.recover_error(completed, e))?;
        self.sink.record(AuditEvent::new(
            "rebalance_step",
            Severity::Info,
            "executor",
            format!("completed {} for {}", step.label(), recommendation.destination_protocol),
            json!({ "step": step.label() }),
        ));
        Ok(())
    }

    async fn run_swap(
        &self,
        completed: &mut Vec<ExecutionStep>,
        recommendation: &RebalanceRecommendation,
        source: Option<&Adapter>,
        destination: &Adapter,
        amount: Decimal,
    ) -> Result<()> {
        // Prefer the destination venue's router if it can swap;
        // otherwise fall back to the source venue (a lending pool can
        // never swap, but its paired AMM sibling might).
        let swapper = destination.build_swap(&recommendation.token_in, &recommendation.token_out, amount, Decimal::ZERO)
            .or_else(|| source.and_then(|s| s.build_swap(&recommendation.token_in, &recommendation.token_out, amount, Decimal::ZERO)));

        let Some(swap_result) = swapper else {
            return Err(self.recover_error(completed, MammonError::Config("no venue can perform the required swap".into())));
        };
        let call = swap_result.map_err(|e| self.recover_error(completed, e))?;
        self.wallet
            .execute(call, ExecuteOptions { wait_for_confirmation: true, confirmations: 1 })
            .await
            .map_err(|e| self.recover_error(completed, e))?;
        completed.push(ExecutionStep::Swapped);
        Ok(())
    }

    /// Wraps any mid-pipeline failure into [`MammonError::PartiallyRecovered`]
    /// once at least one leg has completed — callers need to know the
    /// funds aren't sitting where they started.
    fn recover_error(&self, completed: &[ExecutionStep], cause: MammonError) -> MammonError {
        self.sink.record(AuditEvent::new(
            "transaction_failed",
            Severity::Critical,
            "executor",
            format!("rebalance pipeline failed after {:?}: {cause}", completed),
            json!({ "completed_steps": completed.iter().map(|s| s.label()).collect::<Vec<_>>() }),
        ));
        match completed.last() {
            None => cause,
            Some(last) => MammonError::PartiallyRecovered { at_step: last.label().to_string(), holdings: cause.to_string() },
        }
    }
}
