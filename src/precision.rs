// Decimal rounding for exchange quantities and prices.
//
// Binary floats carry representation noise (0.3 is stored as 0.2999...),
// so rounding goes through the shortest decimal rendering of the value.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64_retain(value))
}

/// Truncate towards zero at `decimals` places
pub fn floor_to_precision(value: f64, decimals: u32) -> f64 {
    to_decimal(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::ToZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

/// Exact decimal string for an exchange parameter, trailing zeros removed
pub fn format_decimal(value: f64, decimals: u32, strategy: RoundingStrategy) -> String {
    to_decimal(value)
        .map(|d| d.round_dp_with_strategy(decimals, strategy).normalize().to_string())
        .unwrap_or_else(|| "0".to_string())
}
