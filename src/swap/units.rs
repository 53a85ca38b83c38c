//! Decimal strings to and from token base units.

use alloy_primitives::U256;

use crate::error::{QuestError, Result};

/// Largest decimals count whose unit fits in a `U256` (`10^77 < 2^256 < 10^78`).
pub const MAX_DECIMALS: u8 = 77;

/// `10^decimals` as a `U256`, or `None` past [`MAX_DECIMALS`].
pub fn unit(decimals: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(decimals))
}

/// Parse a human amount such as `"1.5"` into base units.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let invalid = |reason: &str| QuestError::InvalidInput(format!("'{}': {}", amount, reason));
    if decimals > MAX_DECIMALS {
        return Err(invalid(&format!("unsupported token decimals {}", decimals)));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("not a number"));
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a number"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid(&format!("more than {} decimal places", decimals)));
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid("too large"))
}

/// Render base units as a decimal string without trailing zeros. Decimals
/// past [`MAX_DECIMALS`] render the raw base units.
pub fn format_units(value: U256, decimals: u8) -> String {
    let Some(base) = unit(decimals) else {
        return value.to_string();
    };
    let whole = value / base;
    let frac = value % base;
    if frac.is_zero() {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fraction() {
        assert_eq!(
            parse_units("1", 18).unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units(".25", 2).unwrap(), U256::from(25u64));
        assert_eq!(parse_units("3.", 2).unwrap(), U256::from(300u64));
        assert_eq!(parse_units("0.000", 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units(".", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1e18", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("0.1234567", 6).is_err());
    }

    #[test]
    fn test_parse_overflow() {
        let huge = "9".repeat(90);
        assert!(parse_units(&huge, 18).is_err());
    }

    #[test]
    fn test_unit_stops_at_max_decimals() {
        assert_eq!(unit(0), Some(U256::from(1u64)));
        let max = unit(MAX_DECIMALS).unwrap();
        assert_eq!(max.to_string(), format!("1{}", "0".repeat(77)));
        assert_eq!(unit(MAX_DECIMALS + 1), None);
        assert_eq!(unit(80), None);
        assert!(parse_units("1", 80).is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(2_000u64) * unit(18).unwrap(), 18), "2000");
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(U256::ZERO, 6), "0");
    }

    #[test]
    fn test_format_then_parse_is_identity() {
        let value = U256::from(123_456_789u64);
        assert_eq!(parse_units(&format_units(value, 6), 6).unwrap(), value);
    }
}
