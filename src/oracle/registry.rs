//! Static feed registry keyed by (price-network, canonical symbol),
//! plus wrapped/synonym-ticker canonicalization (spec §4.2).

use std::collections::HashMap;
use std::sync::LazyLock;

use alloy::primitives::{address, Address};

/// Canonicalize wrapped/synonym tickers: wrapped-native collapses to
/// native, bridged stables collapse to their canonical stable.
pub fn canonicalize(symbol: &str) -> String {
    match symbol.to_uppercase().as_str() {
        "WETH" | "WETH9" => "ETH".to_string(),
        "USDBC" | "USDC.E" => "USDC".to_string(),
        other => other.to_string(),
    }
}

static FEEDS: LazyLock<HashMap<(&'static str, &'static str), Address>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    // Ethereum mainnet Chainlink USD feeds — the default `price_network`.
    m.insert(("ethereum", "ETH"), address!("5f4eC3Df9cbd43714FE2740f5E3616155c5b8A3"));
    m.insert(("ethereum", "USDC"), address!("8fFfFfd4AfB6115b954Bd326cbe7B4BA576818f6"));
    m.insert(("ethereum", "USDT"), address!("3E7d1eAB13ad0104d2750B8863b489D65364e32D"));
    m.insert(("ethereum", "DAI"), address!("AEd0c38402a5d19df6E4c03F4E2DceD6e29c1ee9"));
    m
});

pub fn feed_address(price_network: &str, canonical_symbol: &str) -> Option<Address> {
    FEEDS.get(&(price_network, canonical_symbol)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_native_canonicalizes_to_native() {
        assert_eq!(canonicalize("WETH"), "ETH");
        assert_eq!(canonicalize("weth"), "ETH");
    }

    #[test]
    fn bridged_stable_canonicalizes_to_stable() {
        assert_eq!(canonicalize("usdbc"), "USDC");
    }

    #[test]
    fn unrecognized_symbol_passes_through_uppercased() {
        assert_eq!(canonicalize("aero"), "AERO");
    }

    #[test]
    fn known_feed_resolves() {
        assert!(feed_address("ethereum", "ETH").is_some());
    }

    #[test]
    fn unknown_feed_is_none() {
        assert!(feed_address("ethereum", "AERO").is_none());
    }
}
