//! Conversion between the platform's fixed-point base units and display values.
//!
//! Base units are integers scaled by 10^12. Display values carry six
//! fractional digits. All arithmetic is done on `Decimal`, never on floats,
//! so large balances survive the round trip exactly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Base units per display unit.
pub const SCALE: i128 = 1_000_000_000_000;

/// Fractional digits shown for display values.
pub const DISPLAY_DECIMALS: u32 = 6;

const SCALE_EXPONENT: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Format base units as a display string with six fractional digits.
pub fn to_display(base_units: i128) -> Result<String, AmountError> {
    let value = Decimal::try_from_i128_with_scale(base_units, SCALE_EXPONENT)
        .map_err(|_| AmountError::InvalidAmount(base_units.to_string()))?;
    Ok(format_display(value))
}

/// Convert a display value to base units. Digits beyond 10^-12 are truncated.
pub fn to_base_units(display: Decimal) -> Result<i128, AmountError> {
    display
        .checked_mul(Decimal::from(SCALE))
        .and_then(|scaled| scaled.trunc().to_i128())
        .ok_or_else(|| AmountError::InvalidAmount(display.to_string()))
}

/// Parse a user-entered display value (e.g. "1.5") into base units.
pub fn parse_display(input: &str) -> Result<i128, AmountError> {
    to_base_units(parse_decimal(input)?)
}

/// Read base units from a JSON number or numeric string.
pub fn parse_base_units(value: &Value) -> Result<i128, AmountError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i as i128)
            } else if let Some(u) = n.as_u64() {
                Ok(u as i128)
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| AmountError::InvalidAmount(n.to_string()))?;
                let d = Decimal::try_from(f)
                    .map_err(|_| AmountError::InvalidAmount(n.to_string()))?;
                d.trunc()
                    .to_i128()
                    .ok_or_else(|| AmountError::InvalidAmount(n.to_string()))
            }
        }
        Value::String(s) => parse_base_units_str(s),
        other => Err(AmountError::InvalidAmount(other.to_string())),
    }
}

fn parse_base_units_str(input: &str) -> Result<i128, AmountError> {
    let trimmed = input.trim();
    if let Ok(i) = trimmed.parse::<i128>() {
        return Ok(i);
    }
    parse_decimal(trimmed)?
        .trunc()
        .to_i128()
        .ok_or_else(|| AmountError::InvalidAmount(input.to_string()))
}

fn parse_decimal(input: &str) -> Result<Decimal, AmountError> {
    let trimmed = input.trim();
    let parsed = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };
    parsed.map_err(|_| AmountError::InvalidAmount(input.to_string()))
}

fn format_display(value: Decimal) -> String {
    let rounded =
        value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{:.6}", rounded)
}
