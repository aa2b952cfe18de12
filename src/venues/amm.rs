//! Aerodrome-style AMM/LP adapter (spec §4.4), grounded on
//! `venues/lp/aerodrome.rs`'s pool interfaces, simplified from
//! Slipstream's concentrated-liquidity NFT positions to a classic
//! constant-product pair — the spec's data model describes "pair
//! reserves", which is the v2-style shape, not per-tick liquidity.

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
    contract IPair {
        function getReserves() external view returns (uint256 reserve0, uint256 reserve1, uint256 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    #[allow(missing_docs)]
    contract IRouter {
        function addLiquidity(
            address tokenA, address tokenB, bool stable,
            uint256 amountADesired, uint256 amountBDesired,
            uint256 amountAMin, uint256 amountBMin,
            address to, uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);

        function removeLiquidity(
            address tokenA, address tokenB, bool stable,
            uint256 liquidity, uint256 amountAMin, uint256 amountBMin,
            address to, uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB);

        function getAmountOut(uint256 amountIn, address tokenIn, address tokenOut) external view returns (uint256 amount, bool stable);

        struct Route {
            address from;
            address to;
            bool stable;
            address factory;
        }

        function swapExactTokensForTokens(
            uint256 amountIn, uint256 amountOutMin, Route[] calldata routes,
            address to, uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    #[allow(missing_docs)]
    contract IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

pub struct AmmPool {
    pub pool_id: String,
    pub pair_address: Address,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub token0_address: Address,
    pub token1_address: Address,
    pub stable: bool,
}

pub struct AmmAdapter {
    protocol_id: String,
    router_address: Address,
    network: String,
    pools: Vec<AmmPool>,
    transport: Arc<Transport>,
    oracle: Arc<PriceOracle>,
}

impl AmmAdapter {
    pub fn new(
        protocol_id: impl Into<String>,
        router_address: Address,
        network: impl Into<String>,
        pools: Vec<AmmPool>,
        transport: Arc<Transport>,
        oracle: Arc<PriceOracle>,
    ) -> Self {
        AmmAdapter {
            protocol_id: protocol_id.into(),
            router_address,
            network: network.into(),
            pools,
            transport,
            oracle,
        }
    }

    fn pool(&self, pool_id: &str) -> Result<&AmmPool> {
        self.pools
            .iter()
            .find(|p| p.pool_id == pool_id)
            .ok_or_else(|| MammonError::Config(format!("unknown AMM pool '{pool_id}'")))
    }

    async fn read_reserves(&self, pair: Address) -> Result<Option<(U256, U256)>> {
        let call = IPair::getReservesCall {};
        let params = serde_json::json!([
            { "to": format!("{pair:#x}"), "data": format!("0x{}", hex::encode(call.abi_encode())) },
            "latest"
        ]);
        let result = self.transport.call(&self.network, "eth_call", params).await?;
        let hex_str = match result.as_str() {
            Some(s) => s,
            None => return Ok(None),
        };
        let bytes = hex_str.trim_start_matches("0x");
        if bytes.len() < 64 * 2 {
            return Ok(None);
        }
        let r0 = U256::from_str_radix(&bytes[0..64], 16).unwrap_or(U256::ZERO);
        let r1 = U256::from_str_radix(&bytes[64..128], 16).unwrap_or(U256::ZERO);
        Ok(Some((r0, r1)))
    }

    /// Fee-over-TVL APY estimate: without an on-chain fee accumulator
    /// to read, an AMM adapter honestly has no APY signal from reserves
    /// alone, so pool listings report `Unknown` unless a fee/volume
    /// oracle is wired in — this mirrors the spec's "must not fabricate
    /// numbers silently" rule for protocols where the real figure
    /// requires off-chain volume data this adapter doesn't have.
    async fn estimated_apy(&self, _pool: &AmmPool) -> ApyReading {
        ApyReading::Unknown
    }
}

#[async_trait::async_trait]
impl super::VenueAdapter for AmmAdapter {
    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    async fn get_pools(&self) -> Result<Vec<PoolInfo>> {
        let mut out = Vec::with_capacity(self.pools.len());
        for pool in &self.pools {
            let (reserve0, reserve1) = self
                .read_reserves(pool.pair_address)
                .await?
                .unwrap_or((U256::ZERO, U256::ZERO));
            let dec0 = crate::chain::token_decimals(&pool.token0_symbol);
            let dec1 = crate::chain::token_decimals(&pool.token1_symbol);
            let amount0 = crate::money::from_token_units(reserve0, dec0);
            let amount1 = crate::money::from_token_units(reserve1, dec1);

            let price0 = self.oracle.get_price(&pool.token0_symbol).await.ok();
            let price1 = self.oracle.get_price(&pool.token1_symbol).await.ok();
            let (tvl_usd, tvl_is_estimate) = match (price0, price1) {
                (Some(p0), Some(p1)) => (amount0 * p0 + amount1 * p1, false),
                _ => (Decimal::ZERO, true),
            };

            out.push(PoolInfo {
                protocol_id: self.protocol_id.clone(),
                pool_id: pool.pool_id.clone(),
                tokens: vec![pool.token0_symbol.clone(), pool.token1_symbol.clone()],
                kind: PoolKind::Amm {
                    token0: pool.token0_symbol.clone(),
                    token1: pool.token1_symbol.clone(),
                    reserve0: amount0,
                    reserve1: amount1,
                },
                apy: self.estimated_apy(pool).await,
                tvl_usd,
                tvl_is_estimate,
            });
        }
        Ok(out)
    }

    async fn get_pool_apy(&self, pool_id: &str) -> Result<ApyReading> {
        let pool = self.pool(pool_id)?;
        Ok(self.estimated_apy(pool).await)
    }

    fn build_deposit(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        let pool = self.pool(pool_id)?;
        let decimals = crate::chain::token_decimals(token);
        let units = crate::money::to_token_units(amount, decimals);
        let deadline = U256::from(u64::MAX); // filled in with a real deadline by the caller at broadcast time
        let call = IRouter::addLiquidityCall {
            tokenA: pool.token0_address,
            tokenB: pool.token1_address,
            stable: pool.stable,
            amountADesired: units,
            amountBDesired: U256::ZERO,
            amountAMin: U256::ZERO,
            amountBMin: U256::ZERO,
            to: Address::ZERO,
            deadline,
        };
        Ok(TransactionCall {
            to: self.router_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token.to_string(),
            token_decimals: decimals,
        })
    }

    fn build_withdraw(&self, pool_id: &str, token: &str, amount: Decimal) -> Result<TransactionCall> {
        let pool = self.pool(pool_id)?;
        let decimals = crate::chain::token_decimals(token);
        let liquidity = crate::money::to_token_units(amount, 18); // LP tokens are 18-decimal
        let call = IRouter::removeLiquidityCall {
            tokenA: pool.token0_address,
            tokenB: pool.token1_address,
            stable: pool.stable,
            liquidity,
            amountAMin: U256::ZERO,
            amountBMin: U256::ZERO,
            to: Address::ZERO,
            deadline: U256::from(u64::MAX),
        };
        Ok(TransactionCall {
            to: self.router_address,
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
        let token_address = if token == pool.token0_symbol {
            pool.token0_address
        } else if token == pool.token1_symbol {
            pool.token1_address
        } else {
            return Err(MammonError::Config(format!("token '{token}' not part of pool '{pool_id}'")));
        };
        let call = IERC20::approveCall { spender: self.router_address, amount: units };
        Ok(TransactionCall {
            to: token_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token.to_string(),
            token_decimals: decimals,
        })
    }

    fn build_swap(&self, token_in: &str, token_out: &str, amount_in: Decimal, min_out: Decimal) -> Option<Result<TransactionCall>> {
        let decimals_in = crate::chain::token_decimals(token_in);
        let decimals_out = crate::chain::token_decimals(token_out);
        let units_in = crate::money::to_token_units(amount_in, decimals_in);
        let units_out_min = crate::money::to_token_units(min_out, decimals_out);

        let chain_id = match crate::chain::NetworkConfig::lookup(&self.network) {
            Some(n) => n.chain_id,
            None => return Some(Err(MammonError::Config(format!("unknown network '{}'", self.network)))),
        };
        let token_in_addr = match crate::chain::token_address(chain_id, token_in) {
            Some(a) => a,
            None => return Some(Err(MammonError::Config(format!("unknown token '{token_in}' on network '{}'", self.network)))),
        };
        let token_out_addr = match crate::chain::token_address(chain_id, token_out) {
            Some(a) => a,
            None => return Some(Err(MammonError::Config(format!("unknown token '{token_out}' on network '{}'", self.network)))),
        };

        let stable = self
            .pools
            .iter()
            .find(|p| {
                (p.token0_address == token_in_addr && p.token1_address == token_out_addr)
                    || (p.token0_address == token_out_addr && p.token1_address == token_in_addr)
            })
            .map(|p| p.stable)
            .unwrap_or(false);

        let route = IRouter::Route { from: token_in_addr, to: token_out_addr, stable, factory: Address::ZERO };
        let call = IRouter::swapExactTokensForTokensCall {
            amountIn: units_in,
            amountOutMin: units_out_min,
            routes: vec![route],
            to: Address::ZERO, // filled in with the wallet address by the caller at broadcast time
            deadline: U256::from(u64::MAX), // filled in with a real deadline by the caller at broadcast time
        };
        Some(Ok(TransactionCall {
            to: self.router_address,
            value: U256::ZERO,
            calldata: call.abi_encode().into(),
            token_symbol: token_in.to_string(),
            token_decimals: decimals_in,
        }))
    }

    async fn get_user_balance(&self, pool_id: &str, _wallet: Address) -> Result<Decimal> {
        let _pool = self.pool(pool_id)?;
        // LP token balance requires the pair's own balanceOf; omitted
        // here since position tracking reads from the persistence store
        // rather than re-deriving LP balances from chain on every call.
        Ok(Decimal::ZERO)
    }

    async fn estimate_gas(&self, call: &TransactionCall) -> Result<u64> {
        super::estimate_gas_via(&self.transport, &self.network, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;

    #[test]
    fn get_reserves_calldata_encodes_selector() {
        let call = IPair::getReservesCall {};
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], &IPair::getReservesCall::SELECTOR);
    }

    fn test_adapter(network: &str) -> AmmAdapter {
        let sink: Arc<dyn crate::audit::AuditSink> = Arc::new(crate::audit::MemoryAuditSink::default());
        let transport = Arc::new(Transport::new(TransportConfig::default(), sink.clone()));
        let oracle = Arc::new(PriceOracle::new(
            transport.clone(),
            "base",
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(300),
            true,
            sink,
        ));
        let pool = AmmPool {
            pool_id: "usdc-weth".into(),
            pair_address: Address::ZERO,
            token0_symbol: "USDC".into(),
            token1_symbol: "WETH".into(),
            token0_address: crate::chain::token_address(8453, "USDC").unwrap(),
            token1_address: crate::chain::token_address(8453, "WETH").unwrap(),
            stable: false,
        };
        AmmAdapter::new("aerodrome", Address::ZERO, network, vec![pool], transport, oracle)
    }

    #[test]
    fn build_swap_resolves_tokens_on_the_adapters_own_network() {
        let adapter = test_adapter("base");
        let call = adapter.build_swap("USDC", "WETH", Decimal::from(1000), Decimal::ZERO).unwrap().unwrap();
        assert_eq!(&call.calldata[..4], &IRouter::swapExactTokensForTokensCall::SELECTOR);
        assert_eq!(call.to, Address::ZERO); // router_address used in this fixture
    }

    #[test]
    fn build_swap_rejects_a_network_with_no_registered_chain() {
        let adapter = test_adapter("not-a-real-network");
        let result = adapter.build_swap("USDC", "WETH", Decimal::from(1000), Decimal::ZERO).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn build_swap_picks_up_the_pools_stable_flag() {
        let volatile = test_adapter("base");
        let volatile_call = volatile.build_swap("USDC", "WETH", Decimal::from(1000), Decimal::ZERO).unwrap().unwrap();

        let mut stable = test_adapter("base");
        stable.pools[0].stable = true;
        let stable_call = stable.build_swap("USDC", "WETH", Decimal::from(1000), Decimal::ZERO).unwrap().unwrap();

        // The `stable` flag is the only difference between the two
        // adapters, so it must be the only thing that changes the
        // encoded `Route` — confirms it's actually read, not defaulted.
        assert_ne!(volatile_call.calldata, stable_call.calldata);
    }
}
