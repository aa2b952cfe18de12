//! Protocol Adapters (spec §4.4, component C4).
//!
//! Grounded on `venues/lending/aave.rs`'s `IAavePool` and
//! `venues/lp/aerodrome.rs`'s pool interfaces: both use the `sol!`
//! macro purely for ABI encoding (no live `alloy::providers::Provider`
//! — calldata is built locally and handed to `Wallet::execute`, since
//! the pool's own `Transport` owns the RPC round trip, not `alloy`'s
//! provider stack). The two venue kinds are collapsed into one
//! `Adapter` sum type rather than a trait object, per the "lending vs.
//! AMM/LP" polymorphism the spec describes — a `match` dispatch reads
//! closer to the teacher's `LendingVenue`/`LpAction` enums than an
//! extra `dyn Venue` layer would for just two concrete kinds.

pub mod amm;
pub mod lending;

use rust_decimal::Decimal;

use crate::error::Result;
use crate::transport::Transport;
use crate::wallet::TransactionCall;

/// An adapter must not fabricate an APY when on-chain data doesn't
/// support computing one (spec §4.4: "must not fabricate numbers
/// silently"). The scanner filters out `Unknown` opportunities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApyReading {
    Known(Decimal),
    Unknown,
}

#[derive(Debug, Clone)]
pub enum PoolKind {
    Lending { utilization: Decimal, total_supply_usd: Decimal, total_borrow_usd: Decimal },
    Amm { token0: String, token1: String, reserve0: Decimal, reserve1: Decimal },
}

#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub protocol_id: String,
    pub pool_id: String,
    pub tokens: Vec<String>,
    pub kind: PoolKind,
    pub apy: ApyReading,
    pub tvl_usd: Decimal,
    /// Set when TVL couldn't be priced with real feeds for every token
    /// and had to be estimated — callers must not use it for sizing.
    pub tvl_is_estimate: bool,
}

/// Common contract over heterogeneous venues (spec §4.4).
#[async_trait::async_trait]
pub trait VenueAdapter: Send + Sync {
    fn protocol_id(&self) -> &str;
    async fn get_pools(&self) -> Result<Vec<PoolInfo>>;
    async fn get_pool_apy(&self, pool_id: &str) -> Result<ApyReading>;
    fn build_deposit(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall>;
    fn build_withdraw(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall>;
    /// ERC-20 `approve` call granting this venue's contract an
    /// allowance over `token`, ahead of a deposit.
    fn build_approve(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall>;
    /// `None` for venues that cannot swap directly (lending pools).
    fn build_swap(&self, token_in: &str, token_out: &str, amount_in: Decimal, min_out: Decimal) -> Option<Result<TransactionCall>>;
    async fn get_user_balance(&self, pool_id: &str, wallet: alloy::primitives::Address) -> Result<Decimal>;
    /// A per-operation gas estimate via the adapter's own transport,
    /// ahead of the wallet-level estimate `execute()` performs with the
    /// signer's own address as `from` — useful for sizing a candidate
    /// move before a wallet is even in the picture (e.g. the scanner's
    /// profitability pre-check).
    async fn estimate_gas(&self, call: &TransactionCall) -> Result<u64>;
}

pub enum Adapter {
    Lending(lending::LendingAdapter),
    Amm(amm::AmmAdapter),
}

#[async_trait::async_trait]
impl VenueAdapter for Adapter {
    fn protocol_id(&self) -> &str {
        match self {
            Adapter::Lending(a) => a.protocol_id(),
            Adapter::Amm(a) => a.protocol_id(),
        }
    }

    async fn get_pools(&self) -> Result<Vec<PoolInfo>> {
        match self {
            Adapter::Lending(a) => a.get_pools().await,
            Adapter::Amm(a) => a.get_pools().await,
        }
    }

    async fn get_pool_apy(&self, pool_id: &str) -> Result<ApyReading> {
        match self {
            Adapter::Lending(a) => a.get_pool_apy(pool_id).await,
            Adapter::Amm(a) => a.get_pool_apy(pool_id).await,
        }
    }

    fn build_deposit(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        match self {
            Adapter::Lending(a) => a.build_deposit(pool_id, token, amount),
            Adapter::Amm(a) => a.build_deposit(pool_id, token, amount),
        }
    }

    fn build_withdraw(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        match self {
            Adapter::Lending(a) => a.build_withdraw(pool_id, token, amount),
            Adapter::Amm(a) => a.build_withdraw(pool_id, token, amount),
        }
    }

    fn build_approve(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        match self {
            Adapter::Lending(a) => a.build_approve(pool_id, token, amount),
            Adapter::Amm(a) => a.build_approve(pool_id, token, amount),
        }
    }

    fn build_swap(&self, token_in: &str, token_out: &str, amount_in: Decimal, min_out: Decimal) -> Option<Result<TransactionCall>> {
        match self {
            Adapter::Lending(a) => a.build_swap(token_in, token_out, amount_in, min_out),
            Adapter::Amm(a) => a.build_swap(token_in, token_out, amount_in, min_out),
        }
    }

    async fn get_user_balance(&self, pool_id: &str, wallet: alloy::primitives::Address) -> Result<Decimal> {
        match self {
            Adapter::Lending(a) => a.get_user_balance(pool_id, wallet).await,
            Adapter::Amm(a) => a.get_user_balance(pool_id, wallet).await,
        }
    }

    async fn estimate_gas(&self, call: &TransactionCall) -> Result<u64> {
        match self {
            Adapter::Lending(a) => a.estimate_gas(call).await,
            Adapter::Amm(a) => a.estimate_gas(call).await,
        }
    }
}

/// Shared `eth_estimateGas` probe: both adapter kinds submit the built
/// call with no `from` address (the adapter has no signer of its own)
/// over their own `Transport`/network pair.
async fn estimate_gas_via(transport: &Transport, network: &str, call: &TransactionCall) -> Result<u64> {
    let params = serde_json::json!([{
        "to": format!("{:#x}", call.to),
        "value": format!("{:#x}", call.value),
        "data": format!("0x{}", hex::encode(&call.calldata)),
    }]);
    let result = transport.call(network, "eth_estimateGas", params).await?;
    let hex_str = result.as_str().unwrap_or("0x0");
    let units = u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).unwrap_or(u64::MAX);
    Ok(units)
}
