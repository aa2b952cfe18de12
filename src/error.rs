use thiserror::Error;

/// Named error kinds for the decision/execution pipeline (spec §7).
///
/// `Transport`/`RateLimited`/`CircuitOpen` originate in the RPC pool;
/// the rest are raised by the wallet's `execute` gate chain, the
/// executor, or the oracle. Every fatal variant here is written to the
/// audit sink with its Display string before propagating.
#[derive(Debug, Error)]
pub enum MammonError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("rate limited on endpoint {endpoint}")]
    RateLimited { endpoint: String },

    #[error("circuit open on endpoint {endpoint}")]
    CircuitOpen { endpoint: String },

    #[error("simulation reverted: {reason}")]
    Revert { reason: String },

    #[error("gas price cap exceeded: {current_gwei} > {cap_gwei}")]
    GasPriceCapExceeded { current_gwei: f64, cap_gwei: f64 },

    #[error("spending limit exceeded: {scope}")]
    SpendingLimitExceeded { scope: String },

    #[error("approval denied: {status:?}")]
    ApprovalDenied { status: crate::wallet::approval::ApprovalStatus },

    #[error("blocked by dry_run_mode")]
    DryRunBlocked,

    #[error("partially recovered after step {at_step}: holding {holdings}")]
    PartiallyRecovered { at_step: String, holdings: String },

    #[error("oracle price stale for {symbol}")]
    OracleStale { symbol: String },

    #[error("oracle unavailable for {symbol}: {reason}")]
    OracleUnavailable { symbol: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl MammonError {
    /// The event `kind` string used when this error is written to the audit sink.
    pub fn audit_kind(&self) -> &'static str {
        match self {
            MammonError::Transport(_) => "rpc_endpoint_failure",
            MammonError::RateLimited { .. } => "rpc_endpoint_failure",
            MammonError::CircuitOpen { .. } => "rpc_circuit_breaker_opened",
            MammonError::Revert { .. } => "transaction_failed",
            MammonError::GasPriceCapExceeded { .. } => "transaction_failed",
            MammonError::SpendingLimitExceeded { .. } => "spending_limit_exceeded",
            MammonError::ApprovalDenied { .. } => "approval_rejected",
            MammonError::DryRunBlocked => "transaction_failed",
            MammonError::PartiallyRecovered { .. } => "transaction_failed",
            MammonError::OracleStale { .. } => "security_violation",
            MammonError::OracleUnavailable { .. } => "security_violation",
            MammonError::Config(_) => "security_violation",
        }
    }

    /// Whether this error is fatal to the current operation (vs. the
    /// transport's own internal retry/failover, which never surfaces
    /// `RateLimited`/`CircuitOpen` to callers except when every
    /// endpoint is exhausted).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MammonError::CircuitOpen { .. })
    }
}

pub type Result<T> = std::result::Result<T, MammonError>;
