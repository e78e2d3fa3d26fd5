//! Utility functions that are typically used for one situation in multiple places.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ApiError;

pub mod config;
pub mod secret;

/// Decimal places and display width for a currency code. The base asset
/// ("BTC") is scaled by 10^-8, "JPY" by 10^-3 and every other quote
/// currency by 10^-5.
fn scale(currency: &str) -> (u32, usize) {
    match currency {
        "BTC" => (8, 16),
        "JPY" => (3, 12),
        _ => (5, 12),
    }
}

/// Format a fixed-point currency integer as a right-aligned decimal string.
///
/// This is the only place the fixed-point scale is applied; all arithmetic
/// on monetary values elsewhere in the crate stays in integers.
#[must_use]
pub fn int2str(value_int: i64, currency: &str) -> String {
    let (decimals, width) = scale(currency);
    let pow = 10_u64.pow(decimals);
    let magnitude = value_int.unsigned_abs();
    let mut text = format!(
        "{}.{:0fill$}",
        magnitude / pow,
        magnitude % pow,
        fill = decimals as usize
    );
    if value_int < 0 {
        text.insert(0, '-');
    }

    format!("{text:>width$}")
}

/// Parse a decimal string back into the fixed-point integer for the given
/// currency. Accepts the padded output of [`int2str`] as well as bare
/// decimals with fewer fraction digits.
///
/// # Errors
///
/// Will return [`ApiError::ParseNumber`] if the text is not a decimal
/// number or carries more fraction digits than the currency scale allows.
pub fn str2int(text: &str, currency: &str) -> Result<i64, ApiError> {
    let (decimals, _) = scale(currency);
    let text = text.trim();
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (whole, frac) = match unsigned.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (unsigned, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(ApiError::ParseNumber);
    }
    if frac.len() > decimals as usize {
        return Err(ApiError::ParseNumber);
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse()? };
    let mut frac_value: u64 = if frac.is_empty() { 0 } else { frac.parse()? };
    frac_value *= 10_u64.pow(decimals - frac.len() as u32);

    let magnitude = whole
        .checked_mul(10_u64.pow(decimals))
        .and_then(|value| value.checked_add(frac_value))
        .ok_or(ApiError::ParseNumber)?;
    let value = i64::try_from(magnitude).map_err(|_| ApiError::ParseNumber)?;

    Ok(if text.starts_with('-') { -value } else { value })
}

/// Microseconds since the UNIX epoch. The exchange uses this as its
/// sequence token for authenticated calls.
#[must_use]
pub fn epoch_us() -> u64 {
    let since_the_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards");

    since_the_epoch.as_secs() * 1_000_000 + u64::from(since_the_epoch.subsec_micros())
}
