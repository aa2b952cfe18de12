//! Decimal money helpers.
//!
//! Spec §9: "All USD and token amounts are arbitrary-precision
//! decimals, not floats; rounding is documented at the site where
//! integer units (wei) meet user amounts." This module is that site.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Convert a human-readable token amount (e.g. `1.5` USDC) into its
/// on-chain integer representation for a token with `decimals` decimal
/// places. Truncates (does not round) any precision finer than the
/// token supports, matching how ERC-20 transfers silently floor.
pub fn to_token_units(amount: Decimal, decimals: u8) -> U256 {
    let scale = Decimal::from(10u64).powi(decimals as i64);
    let scaled = (amount * scale).trunc();
    let digits = scaled.abs().to_string();
    U256::from_str_radix(&digits, 10).unwrap_or(U256::ZERO)
}

/// Convert on-chain integer units back into a human-readable `Decimal`.
pub fn from_token_units(units: U256, decimals: u8) -> Decimal {
    let as_u128: u128 = units.try_into().unwrap_or(u128::MAX);
    let scale = Decimal::from(10u64).powi(decimals as i64);
    Decimal::from(as_u128) / scale
}

/// Convert a USD amount to token units given a USD-per-token price.
pub fn usd_to_token_units(amount_usd: Decimal, price_usd: Decimal, decimals: u8) -> U256 {
    if price_usd.is_zero() {
        return U256::ZERO;
    }
    to_token_units(amount_usd / price_usd, decimals)
}

/// Convert a token amount to its USD value given a USD-per-token price.
pub fn token_to_usd(amount: Decimal, price_usd: Decimal) -> Decimal {
    amount * price_usd
}

/// Basis points (1 bp = 0.01%) applied to a USD amount.
pub fn apply_bps(amount: Decimal, bps: Decimal) -> Decimal {
    amount * bps / Decimal::from(10_000u32)
}

/// Gwei (10^9 wei) to wei, as a `U256`, used for fee fields.
pub fn gwei_to_wei(gwei: Decimal) -> U256 {
    to_token_units(gwei, 9)
}

/// wei to a `Decimal` number of gwei, used for cap comparisons.
pub fn wei_to_gwei(wei: U256) -> Decimal {
    from_token_units(wei, 9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trip_units() {
        let units = to_token_units(dec!(123.456789), 6);
        assert_eq!(units, U256::from(123_456_789u64));
        let back = from_token_units(units, 6);
        assert_eq!(back, dec!(123.456789));
    }

    #[test]
    fn truncates_excess_precision() {
        // 7 decimal places into a 6-decimal token: the 7th digit is dropped, not rounded.
        let units = to_token_units(dec!(1.0000009), 6);
        assert_eq!(units, U256::from(1_000_000u64));
    }

    #[test]
    fn usd_conversion_round_trips() {
        let units = usd_to_token_units(dec!(200), dec!(2.0), 6);
        assert_eq!(units, U256::from(100_000_000u64));
    }

    #[test]
    fn bps_application() {
        assert_eq!(apply_bps(dec!(1000), dec!(50)), dec!(5.00));
    }

    #[test]
    fn gwei_wei_round_trip() {
        let wei = gwei_to_wei(dec!(1.5));
        assert_eq!(wei_to_gwei(wei), dec!(1.5));
    }
}
