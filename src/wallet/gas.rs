//! EIP-1559 fee policy and tiered gas buffering (spec §4.3).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallComplexity {
    NativeTransfer,
    SimpleContractCall,
    DexSwap,
    ComplexMultiHop,
}

impl CallComplexity {
    /// Classify by calldata length per the spec's tiering table.
    pub fn classify(calldata_len: usize) -> Self {
        if calldata_len == 0 {
            CallComplexity::NativeTransfer
        } else if calldata_len < 100 {
            CallComplexity::SimpleContractCall
        } else if calldata_len < 500 {
            CallComplexity::DexSwap
        } else {
            CallComplexity::ComplexMultiHop
        }
    }

    pub fn buffer_multiplier(&self) -> Decimal {
        match self {
            CallComplexity::NativeTransfer => dec!(1.20),
            CallComplexity::SimpleContractCall => dec!(1.30),
            CallComplexity::DexSwap => dec!(1.50),
            CallComplexity::ComplexMultiHop => dec!(2.00),
        }
    }
}

/// Applies the tiered buffer to a raw `eth_estimateGas` result.
pub fn buffered_gas_limit(estimated: u64, calldata_len: usize) -> u64 {
    let multiplier = CallComplexity::classify(calldata_len).buffer_multiplier();
    let buffered = Decimal::from(estimated) * multiplier;
    buffered.round().try_into().unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy)]
pub struct Eip1559Fees {
    pub max_priority_fee_gwei: Decimal,
    pub max_fee_gwei: Decimal,
}

/// `maxFeePerGas = 2 * base_fee + priority`, per spec §4.3.
pub fn compute_fees(base_fee_gwei: Decimal, max_priority_fee_gwei: Decimal) -> Eip1559Fees {
    Eip1559Fees {
        max_priority_fee_gwei,
        max_fee_gwei: dec!(2) * base_fee_gwei + max_priority_fee_gwei,
    }
}

/// `None` if the computed max fee is under the configured cap, `Some`
/// with the offending value otherwise.
pub fn enforce_cap(fees: &Eip1559Fees, cap_gwei: Decimal) -> Option<(f64, f64)> {
    if fees.max_fee_gwei > cap_gwei {
        Some((
            fees.max_fee_gwei.try_into().unwrap_or(f64::MAX),
            cap_gwei.try_into().unwrap_or(f64::MAX),
        ))
    } else {
        None
    }
}
