//! Utility functions for the Patron indexer.

mod conversion;

/// Decimals of the chain's native token (18 on EVM chains). Tip and bounty
/// amounts are denominated in the native token.
pub const NATIVE_DECIMALS: i64 = 18;

pub use conversion::{base_units_to_decimal, hex_encode};
