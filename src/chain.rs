//! Network configuration (spec §3: `NetworkConfig`).

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// A target EVM network. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: String,
    pub chain_id: u64,
    pub default_rpc_url: String,
    pub explorer_base: String,
    pub native_symbol: String,
    pub is_testnet: bool,
}

impl NetworkConfig {
    pub fn lookup(id: &str) -> Option<&'static NetworkConfig> {
        NETWORKS.iter().find(|n| n.id.eq_ignore_ascii_case(id))
    }
}

/// Static registry of supported L2 networks, modeled on the teacher's
/// `(chain_id, symbol) -> Address` registries in `venues/evm.rs`.
pub static NETWORKS: LazyLock<Vec<NetworkConfig>> = LazyLock::new(|| {
    vec![
        NetworkConfig {
            id: "base".into(),
            chain_id: 8453,
            default_rpc_url: "https://mainnet.base.org".into(),
            explorer_base: "https://basescan.org".into(),
            native_symbol: "ETH".into(),
            is_testnet: false,
        },
        NetworkConfig {
            id: "arbitrum".into(),
            chain_id: 42161,
            default_rpc_url: "https://arb1.arbitrum.io/rpc".into(),
            explorer_base: "https://arbiscan.io".into(),
            native_symbol: "ETH".into(),
            is_testnet: false,
        },
        NetworkConfig {
            id: "optimism".into(),
            chain_id: 10,
            default_rpc_url: "https://mainnet.optimism.io".into(),
            explorer_base: "https://optimistic.etherscan.io".into(),
            native_symbol: "ETH".into(),
            is_testnet: false,
        },
        NetworkConfig {
            id: "base-sepolia".into(),
            chain_id: 84532,
            default_rpc_url: "https://sepolia.base.org".into(),
            explorer_base: "https://sepolia.basescan.org".into(),
            native_symbol: "ETH".into(),
            is_testnet: true,
        },
    ]
});

/// ERC-20 token address registry, keyed by (chain_id, symbol), following
/// `venues/evm.rs`'s `lazy_static_token_registry!` macro shape.
pub static TOKEN_REGISTRY: LazyLock<std::collections::HashMap<(u64, String), alloy::primitives::Address>> =
    LazyLock::new(|| {
        use alloy::primitives::address;
        let mut m = std::collections::HashMap::new();
        m.insert((8453, "USDC".to_string()), address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"));
        m.insert((8453, "WETH".to_string()), address!("4200000000000000000000000000000000000006"));
        m.insert((8453, "AERO".to_string()), address!("940181a94A35A4569E4529A3CDfB74e38FD98631"));
        m.insert((8453, "DAI".to_string()), address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb"));
        m.insert((42161, "USDC".to_string()), address!("af88d065e77c8cC2239327C5EDb3A432268e5831"));
        m.insert((42161, "WETH".to_string()), address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"));
        m.insert((42161, "ARB".to_string()), address!("912CE59144191C1204E64559FE8253a0e49E6548"));
        m.insert((10, "USDC".to_string()), address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85"));
        m.insert((10, "WETH".to_string()), address!("4200000000000000000000000000000000000006"));
        m
    });

pub fn token_address(chain_id: u64, symbol: &str) -> Option<alloy::primitives::Address> {
    TOKEN_REGISTRY.get(&(chain_id, symbol.to_uppercase())).copied()
}

/// Per-token decimal precision. ERC-20 `decimals()` is a view call in
/// production; this registry backstops the common tokens so the
/// profitability engine and oracle don't need a round trip just to
/// know a stablecoin has 6 decimals.
pub fn token_decimals(symbol: &str) -> u8 {
    match symbol.to_uppercase().as_str() {
        "USDC" | "USDT" => 6,
        "WBTC" => 8,
        _ => 18,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_network() {
        let n = NetworkConfig::lookup("base").unwrap();
        assert_eq!(n.chain_id, 8453);
    }

    #[test]
    fn unknown_network_is_none() {
        assert!(NetworkConfig::lookup("nonexistent-l2").is_none());
    }

    #[test]
    fn token_lookup_case_insensitive() {
        assert!(token_address(8453, "usdc").is_some());
    }
}
