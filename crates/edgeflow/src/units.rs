//! Parsing of the human-readable property values used throughout the
//! configuration: time periods (`"10 min"`, `"500 ms"`) and data sizes
//! (`"0 B"`, `"10 KB"`).
//!
//! Values are parsed at schedule time so a malformed value surfaces as an
//! [`EdgeflowError::Config`] instead of silently falling back to a default.

use crate::error::{EdgeflowError, Result};
use std::time::Duration;

/// Parses `"<number> <unit>"` into a [`Duration`].
///
/// Units are case-insensitive and whitespace between the number and the unit
/// is optional. A bare number is interpreted as milliseconds.
pub fn parse_time_period(input: &str) -> Result<Duration> {
    let (number, unit) = split_number(input)?;
    let unit = match unit.to_ascii_lowercase().as_str() {
        "" | "msecs" | "millisecond" | "milliseconds" => "ms".to_string(),
        other => other.to_string(),
    };
    humantime::parse_duration(&format!("{}{}", number, unit))
        .map_err(|e| EdgeflowError::Config(format!("invalid time period '{}': {}", input, e)))
}

/// Parses a data size into bytes.
///
/// Single-letter units (`K`, `M`, ...) are decimal, two-letter units (`KB`,
/// `MB`, ...) and the `KiB` family are binary.
pub fn parse_data_size(input: &str) -> Result<u64> {
    let (number, unit) = split_number(input)?;
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "KB" | "KIB" => 1 << 10,
        "MB" | "MIB" => 1 << 20,
        "GB" | "GIB" => 1 << 30,
        "TB" | "TIB" => 1 << 40,
        "PB" | "PIB" => 1 << 50,
        other => {
            return Err(EdgeflowError::Config(format!(
                "unknown data size unit '{}' in '{}'",
                other, input
            )))
        }
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| EdgeflowError::Config(format!("data size '{}' is out of range", input)))
}

/// Parses an optional property: `None` and blank strings mean "not set".
pub fn parse_optional<T>(
    value: Option<&str>,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Option<T>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse(v).map(Some),
    }
}

fn split_number(input: &str) -> Result<(u64, &str)> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(EdgeflowError::Config(format!(
            "'{}' does not start with a number",
            input
        )));
    }
    let number = digits
        .parse::<u64>()
        .map_err(|e| EdgeflowError::Config(format!("invalid number in '{}': {}", input, e)))?;
    Ok((number, unit.trim()))
}
