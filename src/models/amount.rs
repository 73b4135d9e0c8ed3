//! Fixed-point helpers. Every price and amount is a `Decimal`; floats only
//! appear when a trade is serialized for downstream consumers.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest scale `Decimal` can carry.
const MAX_SCALE: u8 = 28;

/// Convert a raw on-chain integer amount into token units.
pub fn raw_to_decimal(raw: u64, decimals: u8) -> Decimal {
    if decimals > MAX_SCALE {
        return Decimal::ZERO;
    }
    Decimal::try_from_i128_with_scale(raw as i128, decimals as u32).unwrap_or(Decimal::ZERO)
}

/// Convert an unsigned 128-bit quantity (CLMM liquidity, sqrt price) into a
/// `Decimal`, saturating at `Decimal::MAX`.
pub fn u128_to_decimal(value: u128) -> Decimal {
    i128::try_from(value)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
        .unwrap_or(Decimal::MAX)
}

/// `a / b`, or `None` when `b` is zero or the quotient overflows.
pub fn checked_ratio(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        return None;
    }
    a.checked_div(b)
}

/// `a * b`, saturating instead of panicking on overflow.
pub fn saturating_mul(a: Decimal, b: Decimal) -> Decimal {
    a.checked_mul(b).unwrap_or(Decimal::MAX)
}

/// Parse a decimal column stored as TEXT; malformed values read as zero.
pub fn parse_decimal(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap_or(Decimal::ZERO)
}

/// Arithmetic mean after dropping the single smallest and largest samples.
/// With fewer than three samples the plain mean is returned.
pub fn trimmed_mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let kept = if sorted.len() >= 3 { &sorted[1..sorted.len() - 1] } else { &sorted[..] };
    let sum: Decimal = kept.iter().copied().sum();
    checked_ratio(sum, Decimal::from(kept.len()))
}
