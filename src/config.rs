//! Configuration (spec §6).
//!
//! Grounded on `run/config.rs`'s `RuntimeConfig::from_cli`, which
//! resolves the private key from `DEFI_FLOW_PRIVATE_KEY` or
//! `DEFI_FLOW_PRIVATE_KEY_FILE` before falling back to an error. MAMMON
//! generalizes that precedence rule to every secret-shaped key.

use std::env;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{MammonError, Result};

#[derive(Debug, Clone)]
pub struct MammonConfig {
    pub network: String,
    pub rpc_url: Option<String>,

    pub premium_rpc_enabled: bool,
    pub premium_rpc_percentage: u8,
    pub alchemy_api_key: Option<String>,
    pub quicknode_endpoint: Option<String>,
    pub alchemy_rate_limit_per_second: u32,
    pub quicknode_rate_limit_per_second: u32,
    pub public_rate_limit_per_second: u32,
    pub rpc_failure_threshold: u32,
    pub rpc_recovery_timeout_secs: u64,

    pub wallet_mnemonic: String,
    pub use_local_wallet: bool,

    pub max_gas_price_gwei: Decimal,
    pub max_priority_fee_gwei: Decimal,

    pub max_transaction_value_usd: Decimal,
    pub daily_spending_limit_usd: Decimal,
    pub approval_threshold_usd: Decimal,

    pub min_apy_improvement_pp: Decimal,
    pub min_annual_gain_usd: Decimal,
    pub max_break_even_days: u32,
    pub max_cost_pct: Decimal,
    pub min_rebalance_amount_usd: Decimal,
    pub min_pool_tvl_usd: Decimal,

    pub max_concentration_pct: Decimal,
    pub large_position_threshold_usd: Decimal,
    pub risk_tolerance: RiskTolerance,
    pub allow_high_risk: bool,
    pub diversification_target_k: usize,

    pub chainlink_enabled: bool,
    pub chainlink_price_network: String,
    pub chainlink_cache_ttl_seconds: u64,
    pub chainlink_max_staleness_seconds: u64,
    pub chainlink_fallback_to_mock: bool,

    pub dry_run_mode: bool,
    pub scan_interval_seconds: u64,
    pub max_rebalances_per_tick: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl MammonConfig {
    /// Load from environment variables, following the `_FILE` secret
    /// precedence established by `run/config.rs`.
    pub fn from_env() -> Result<Self> {
        let wallet_mnemonic = secret("MAMMON_WALLET_MNEMONIC")?
            .ok_or_else(|| MammonError::Config(
                "MAMMON_WALLET_MNEMONIC or MAMMON_WALLET_MNEMONIC_FILE is required".into(),
            ))?;

        let cfg = MammonConfig {
            network: env::var("MAMMON_NETWORK")
                .map_err(|_| MammonError::Config("MAMMON_NETWORK is required".into()))?,
            rpc_url: env::var("MAMMON_RPC_URL").ok(),

            premium_rpc_enabled: env_bool("MAMMON_PREMIUM_RPC_ENABLED", false),
            premium_rpc_percentage: env_u8("MAMMON_PREMIUM_RPC_PERCENTAGE", 50),
            alchemy_api_key: secret("MAMMON_ALCHEMY_API_KEY")?,
            quicknode_endpoint: secret("MAMMON_QUICKNODE_ENDPOINT")?,
            alchemy_rate_limit_per_second: env_u32("MAMMON_ALCHEMY_RATE_LIMIT_PER_SECOND", 25),
            quicknode_rate_limit_per_second: env_u32("MAMMON_QUICKNODE_RATE_LIMIT_PER_SECOND", 25),
            public_rate_limit_per_second: env_u32("MAMMON_PUBLIC_RATE_LIMIT_PER_SECOND", 5),
            rpc_failure_threshold: env_u32("MAMMON_RPC_FAILURE_THRESHOLD", 3),
            rpc_recovery_timeout_secs: env_u64("MAMMON_RPC_RECOVERY_TIMEOUT", 60),

            wallet_mnemonic,
            use_local_wallet: env_bool("MAMMON_USE_LOCAL_WALLET", true),

            max_gas_price_gwei: env_decimal("MAMMON_MAX_GAS_PRICE_GWEI", dec!(100)),
            max_priority_fee_gwei: env_decimal("MAMMON_MAX_PRIORITY_FEE_GWEI", dec!(1.5)),

            max_transaction_value_usd: env_decimal("MAMMON_MAX_TRANSACTION_VALUE_USD", dec!(5000)),
            daily_spending_limit_usd: env_decimal("MAMMON_DAILY_SPENDING_LIMIT_USD", dec!(20000)),
            approval_threshold_usd: env_decimal("MAMMON_APPROVAL_THRESHOLD_USD", dec!(2000)),

            min_apy_improvement_pp: env_decimal("MAMMON_MIN_APY_IMPROVEMENT_PP", dec!(0.5)),
            min_annual_gain_usd: env_decimal("MAMMON_MIN_ANNUAL_GAIN_USD", dec!(10)),
            max_break_even_days: env_u32("MAMMON_MAX_BREAK_EVEN_DAYS", 30),
            max_cost_pct: env_decimal("MAMMON_MAX_COST_PCT", dec!(0.01)),
            min_rebalance_amount_usd: env_decimal("MAMMON_MIN_REBALANCE_AMOUNT_USD", dec!(50)),
            min_pool_tvl_usd: env_decimal("MAMMON_MIN_POOL_TVL_USD", dec!(100_000)),

            max_concentration_pct: env_decimal("MAMMON_MAX_CONCENTRATION_PCT", dec!(0.40)),
            large_position_threshold_usd: env_decimal("MAMMON_LARGE_POSITION_THRESHOLD_USD", dec!(50000)),
            risk_tolerance: match env::var("MAMMON_RISK_TOLERANCE").as_deref() {
                Ok("low") => RiskTolerance::Low,
                Ok("high") => RiskTolerance::High,
                _ => RiskTolerance::Medium,
            },
            allow_high_risk: env_bool("MAMMON_ALLOW_HIGH_RISK", false),
            diversification_target_k: env_u32("MAMMON_DIVERSIFICATION_TARGET_K", 3) as usize,

            chainlink_enabled: env_bool("MAMMON_CHAINLINK_ENABLED", true),
            chainlink_price_network: env::var("MAMMON_CHAINLINK_PRICE_NETWORK")
                .unwrap_or_else(|_| "ethereum".into()),
            chainlink_cache_ttl_seconds: env_u64("MAMMON_CHAINLINK_CACHE_TTL_SECONDS", 300),
            chainlink_max_staleness_seconds: env_u64("MAMMON_CHAINLINK_MAX_STALENESS_SECONDS", 3600),
            chainlink_fallback_to_mock: env_bool("MAMMON_CHAINLINK_FALLBACK_TO_MOCK", true),

            dry_run_mode: env_bool("MAMMON_DRY_RUN_MODE", true),
            scan_interval_seconds: env_u64("MAMMON_SCAN_INTERVAL_SECONDS", 300),
            max_rebalances_per_tick: env_u32("MAMMON_MAX_REBALANCES_PER_TICK", 1) as usize,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.premium_rpc_percentage > 100 {
            return Err(MammonError::Config(
                "premium_rpc_percentage must be in 0..=100".into(),
            ));
        }
        if crate::chain::NetworkConfig::lookup(&self.network).is_none() {
            return Err(MammonError::Config(format!("unknown network '{}'", self.network)));
        }
        if self.max_concentration_pct <= Decimal::ZERO || self.max_concentration_pct > Decimal::ONE {
            return Err(MammonError::Config(
                "max_concentration_pct must be in (0, 1]".into(),
            ));
        }
        if self.diversification_target_k == 0 {
            return Err(MammonError::Config("diversification_target_k must be >= 1".into()));
        }
        Ok(())
    }
}

/// Resolve a secret value: `<KEY>` directly, else `<KEY>_FILE` pointing
/// at a file on disk, else `None`. Never logs the resolved value.
fn secret(key: &str) -> Result<Option<String>> {
    if let Ok(v) = env::var(key) {
        return Ok(Some(v));
    }
    let file_key = format!("{key}_FILE");
    if let Ok(path) = env::var(&file_key) {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| MammonError::Config(format!("reading {file_key} at {path}: {e}")))?;
        return Ok(Some(contents.trim().to_string()));
    }
    Ok(None)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_premium_percentage() {
        let mut cfg = sample_config();
        cfg.premium_rpc_percentage = 150;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_network() {
        let mut cfg = sample_config();
        cfg.network = "not-a-real-chain".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        assert!(sample_config().validate().is_ok());
    }

    fn sample_config() -> MammonConfig {
        MammonConfig {
            network: "base".into(),
            rpc_url: None,
            premium_rpc_enabled: false,
            premium_rpc_percentage: 50,
            alchemy_api_key: None,
            quicknode_endpoint: None,
            alchemy_rate_limit_per_second: 25,
            quicknode_rate_limit_per_second: 25,
            public_rate_limit_per_second: 5,
            rpc_failure_threshold: 3,
            rpc_recovery_timeout_secs: 60,
            wallet_mnemonic: "test test test test test test test test test test test junk".into(),
            use_local_wallet: true,
            max_gas_price_gwei: dec!(100),
            max_priority_fee_gwei: dec!(1.5),
            max_transaction_value_usd: dec!(5000),
            daily_spending_limit_usd: dec!(20000),
            approval_threshold_usd: dec!(2000),
            min_apy_improvement_pp: dec!(0.5),
            min_annual_gain_usd: dec!(10),
            max_break_even_days: 30,
            max_cost_pct: dec!(0.01),
            min_rebalance_amount_usd: dec!(50),
            min_pool_tvl_usd: dec!(100_000),
            max_concentration_pct: dec!(0.40),
            large_position_threshold_usd: dec!(50000),
            risk_tolerance: RiskTolerance::Medium,
            allow_high_risk: false,
            diversification_target_k: 3,
            chainlink_enabled: true,
            chainlink_price_network: "ethereum".into(),
            chainlink_cache_ttl_seconds: 300,
            chainlink_max_staleness_seconds: 3600,
            chainlink_fallback_to_mock: true,
            dry_run_mode: true,
            scan_interval_seconds: 300,
            max_rebalances_per_tick: 1,
        }
    }
}
