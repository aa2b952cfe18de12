//! Aave-style lending adapter (spec §4.4), grounded on
//! `venues/lending/aave.rs`'s `IAavePool` interface.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

use crate::error::{MammonError, Result};
use crate::oracle::PriceOracle;
use crate::transport::Transport;
use crate::wallet::TransactionCall;
use super::{ApyReading, PoolInfo, PoolKind};

sol! {
    #[allow(missing_docs)]
    contract IAavePool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
        function getReserveData(address asset) external view returns (
            uint256 configuration,
            uint128 liquidityIndex,
            uint128 currentLiquidityRate,
            uint128 variableBorrowIndex,
            uint128 currentVariableBorrowRate,
            uint128 currentStableBorrowRate,
            uint40 lastUpdateTimestamp,
            uint16 id,
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress,
            address interestRateStrategyAddress,
            uint128 accruedToTreasury,
            uint128 unbacked,
            uint128 isolationModeTotalDebt
        );
    }

    #[allow(missing_docs)]
    contract IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
    }
}

/// The reserve-data fields this adapter actually reads: the supply rate
/// plus the three token addresses `getReserveData` already returns,
/// needed to derive total supply/borrow/utilization without a second
/// round trip to look them up.
#[derive(Debug, PartialEq)]
struct ReserveSnapshot {
    liquidity_rate: Option<Decimal>,
    a_token: Address,
    stable_debt_token: Address,
    variable_debt_token: Address,
}

/// `getReserveData`'s return is 15 right-padded 32-byte words; this
/// reads only the ones the adapter needs: 2 = currentLiquidityRate
/// (ray, 1e27), 8 = aTokenAddress, 9 = stableDebtTokenAddress,
/// 10 = variableDebtTokenAddress.
fn decode_reserve_data(hex_str: &str) -> Option<ReserveSnapshot> {
    let bytes = hex_str.trim_start_matches("0x");
    let word = |i: usize| bytes.get(i * 64..(i + 1) * 64);
    let address_from_word = |w: &str| -> Address {
        let tail = &w[w.len() - 40..];
        format!("0x{tail}").parse::<Address>().unwrap_or(Address::ZERO)
    };

    let rate_ray = word(2).and_then(|w| u128::from_str_radix(w, 16).ok()).unwrap_or(0);
    let liquidity_rate = if rate_ray == 0 {
        None
    } else {
        let ray = Decimal::from(10u64).powi(27);
        Some((Decimal::from(rate_ray) / ray) * Decimal::from(100))
    };

    let a_token = address_from_word(word(8)?);
    let stable_debt_token = word(9).map(address_from_word).unwrap_or(Address::ZERO);
    let variable_debt_token = word(10).map(address_from_word).unwrap_or(Address::ZERO);

    Some(ReserveSnapshot { liquidity_rate, a_token, stable_debt_token, variable_debt_token })
}

/// One supported token per pool, since Aave-style pools are per-reserve
/// rather than per-pair — matches the teacher's one-pool-per-asset model.
pub struct LendingPool {
    pub pool_id: String,
    pub asset_symbol: String,
    pub asset_address: Address,
}

pub struct LendingAdapter {
    protocol_id: String,
    pool_address: Address,
    network: String,
    pools: Vec<LendingPool>,
    transport: Arc<Transport>,
    oracle: Arc<PriceOracle>,
}

impl LendingAdapter {
    pub fn new(
        protocol_id: impl Into<String>,
        pool_address: Address,
        network: impl Into<String>,
        pools: Vec<LendingPool>,
        transport: Arc<Transport>,
        oracle: Arc<PriceOracle>,
    ) -> Self {
        LendingAdapter {
            protocol_id: protocol_id.into(),
            pool_address,
            network: network.into(),
            pools,
            transport,
            oracle,
        }
    }

    fn pool(&self, pool_id: &str) -> Result<&LendingPool> {
        self.pools
            .iter()
            .find(|p| p.pool_id == pool_id)
            .ok_or_else(|| MammonError::Config(format!("unknown lending pool '{pool_id}'")))
    }

    /// Reads `getReserveData` and pulls out the supply rate plus the
    /// aToken/debt-token addresses it already returns, rather than
    /// discarding everything but the rate and re-deriving the rest
    /// from a second, separate contract.
    async fn read_reserve_data(&self, asset: Address) -> Result<Option<ReserveSnapshot>> {
        let call = IAavePool::getReserveDataCall { asset };
        let calldata = call.abi_encode();
        let params = serde_json::json!([
            { "to": format!("{:#x}", self.pool_address), "data": format!("0x{}", hex::encode(calldata)) },
            "latest"
        ]);
        let result = self.transport.call(&self.network, "eth_call", params).await?;
        let hex_str = match result.as_str() {
            Some(s) => s,
            None => return Ok(None),
        };
        Ok(decode_reserve_data(hex_str))
    }

    async fn read_token_total_supply(&self, token: Address, decimals: u8) -> Result<Decimal> {
        if token == Address::ZERO {
            return Ok(Decimal::ZERO);
        }
        let call = IERC20::totalSupplyCall {};
        let params = serde_json::json!([
            { "to": format!("{token:#x}"), "data": format!("0x{}", hex::encode(call.abi_encode())) },
            "latest"
        ]);
        let result = self.transport.call(&self.network, "eth_call", params).await?;
        let hex_str = result.as_str().unwrap_or("0x0");
        let units = U256::from_str_radix(hex_str.trim_start_matches("0x"), 16).unwrap_or(U256::ZERO);
        Ok(crate::money::from_token_units(units, decimals))
    }
}

#[async_trait::async_trait]
impl super::VenueAdapter for LendingAdapter {
    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    async fn get_pools(&self) -> Result<Vec<PoolInfo>> {
        let mut out = Vec::with_capacity(self.pools.len());
        for pool in &self.pools {
            let decimals = crate::chain::token_decimals(&pool.asset_symbol);
            let snapshot = self.read_reserve_data(pool.asset_address).await.ok().flatten();
            let price = self.oracle.get_price(&pool.asset_symbol).await.unwrap_or(Decimal::ZERO);

            let (apy, utilization, total_supply_usd, total_borrow_usd, tvl_usd) = match &snapshot {
                Some(s) => {
                    let apy = match s.liquidity_rate {
                        Some(rate) => ApyReading::Known(rate),
                        None => ApyReading::Unknown,
                    };
                    let supply = self.read_token_total_supply(s.a_token, decimals).await.unwrap_or(Decimal::ZERO);
                    let stable_debt =
                        self.read_token_total_supply(s.stable_debt_token, decimals).await.unwrap_or(Decimal::ZERO);
                    let variable_debt =
                        self.read_token_total_supply(s.variable_debt_token, decimals).await.unwrap_or(Decimal::ZERO);
                    let borrow = stable_debt + variable_debt;
                    let utilization = if supply.is_zero() { Decimal::ZERO } else { (borrow / supply) * Decimal::from(100) };
                    (apy, utilization, supply * price, borrow * price, supply * price)
                }
                None => (ApyReading::Unknown, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            };

            out.push(PoolInfo {
                protocol_id: self.protocol_id.clone(),
                pool_id: pool.pool_id.clone(),
                tokens: vec![pool.asset_symbol.clone()],
                kind: PoolKind::Lending { utilization, total_supply_usd, total_borrow_usd },
                apy,
                tvl_usd,
                // Derived from totalSupply reads taken alongside the rate read
                // rather than the reserve's own accrual, so it's always an
                // estimate, not an exact on-chain figure.
                tvl_is_estimate: true,
            });
        }
        Ok(out)
    }

    async fn get_pool_apy(&self, pool_id: &str) -> Result<ApyReading> {
        let pool = self.pool(pool_id)?;
        match self.read_reserve_data(pool.asset_address).await? {
            Some(ReserveSnapshot { liquidity_rate: Some(rate), .. }) => Ok(ApyReading::Known(rate)),
            _ => Ok(ApyReading::Unknown),
        }
    }

    fn build_deposit(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        let pool = self.pool(pool_id)?;
        let decimals = crate::chain::token_decimals(token);
        let units = crate::money::to_token_units(amount, decimals);
        let call = IAavePool::supplyCall {
            asset: pool.asset_address,
            amount: units,
            onBehalfOf: Address::ZERO, // filled in by the wallet at build time
            referralCode: 0,
        };
        Ok(TransactionCall {
            to: self.pool_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token.to_string(),
            token_decimals: decimals,
        })
    }

    fn build_withdraw(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        let pool = self.pool(pool_id)?;
        let decimals = crate::chain::token_decimals(token);
        let units = crate::money::to_token_units(amount, decimals);
        let call = IAavePool::withdrawCall {
            asset: pool.asset_address,
            amount: units,
            to: Address::ZERO,
        };
        Ok(TransactionCall {
            to: self.pool_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token.to_string(),
            token_decimals: decimals,
        })
    }

    fn build_approve(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        let pool = self.pool(pool_id)?;
        let decimals = crate::chain::token_decimals(token);
        let units = crate::money::to_token_units(amount, decimals);
        let call = IERC20::approveCall { spender: self.pool_address, amount: units };
        Ok(TransactionCall {
            to: pool.asset_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token.to_string(),
            token_decimals: decimals,
        })
    }

    fn build_swap(&self, _token_in: &str, _token_out: &str, _amount_in: Decimal, _min_out: Decimal) -> Option<Result<TransactionCall>> {
        None // lending pools never swap directly
    }

    async fn get_user_balance(&self, pool_id: &str, wallet: Address) -> Result<Decimal> {
        let pool = self.pool(pool_id)?;
        let call = IERC20::balanceOfCall { account: wallet };
        let params = serde_json::json!([
            { "to": format!("{:#x}", pool.asset_address), "data": format!("0x{}", hex::encode(call.abi_encode())) },
            "latest"
        ]);
        let result = self.transport.call(&self.network, "eth_call", params).await?;
        let hex_str = result.as_str().unwrap_or("0x0");
        let units = U256::from_str_radix(hex_str.trim_start_matches("0x"), 16).unwrap_or(U256::ZERO);
        let decimals = crate::chain::token_decimals(&pool.asset_symbol);
        Ok(crate::money::from_token_units(units, decimals))
    }

    async fn estimate_gas(&self, call: &TransactionCall) -> Result<u64> {
        super::estimate_gas_via(&self.transport, &self.network, call).await
    }
}
