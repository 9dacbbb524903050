//! Conversions between chain-native fixed-point integers and
//! arbitrary-precision decimals.

use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Convert a U256 amount in base units to an exact decimal value with
/// `decimals` fractional digits.
///
/// The mantissa is carried over bit-for-bit and the scale is fixed, so the
/// result is exact for every possible input. Monetary amounts must never
/// pass through a float on their way to the store.
pub fn base_units_to_decimal(value: U256, decimals: i64) -> BigDecimal {
    let bytes: [u8; 32] = value.to_le_bytes();
    let mantissa = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    BigDecimal::new(mantissa, decimals)
}
