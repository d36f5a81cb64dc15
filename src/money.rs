//! Unit Conversion Module
//!
//! Conversion between on-chain integer amounts (`BigUint`, smallest unit) and
//! human-readable decimal strings. Used for CLI display and for turning a
//! configured transfer amount such as `"0.01"` into wei.
//!
//! ```rust
//! use shielded_ops::money::{format_units, parse_units};
//!
//! let wei = parse_units("0.01", 18).unwrap();
//! assert_eq!(wei.to_string(), "10000000000000000");
//! assert_eq!(format_units(&wei, 18), "0.01");
//! ```

use num_bigint::BigUint;
use thiserror::Error;

/// Unit conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// `10^decimals` as a `BigUint`
fn scale(decimals: u32) -> BigUint {
    BigUint::from(10u32).pow(decimals)
}

/// Parse a decimal string into the smallest unit.
///
/// # Errors
/// * `PrecisionOverflow` - more fractional digits than `decimals`
/// * `InvalidFormat` - empty input, signs, or non-digit characters
pub fn parse_units(amount: &str, decimals: u32) -> Result<BigUint, MoneyError> {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(MoneyError::InvalidFormat(amount.to_string()));
    }

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(MoneyError::InvalidFormat(amount.to_string()));
    }

    let provided = frac_part.len() as u32;
    if provided > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: decimals,
        });
    }

    let padded = format!(
        "{}{}{}",
        int_part,
        frac_part,
        "0".repeat((decimals - provided) as usize)
    );
    let digits = padded.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(BigUint::ZERO);
    }

    BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| MoneyError::InvalidFormat(amount.to_string()))
}

/// Format a smallest-unit amount as a decimal string, trimming trailing zeros.
pub fn format_units(amount: &BigUint, decimals: u32) -> String {
    let unit = scale(decimals);
    let int_part = amount / &unit;
    let frac_part = amount % &unit;

    if frac_part == BigUint::ZERO {
        return int_part.to_string();
    }

    let frac = format!("{:0>width$}", frac_part.to_string(), width = decimals as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Convert a gwei amount to wei.
pub fn gwei(amount: &str) -> Result<BigUint, MoneyError> {
    parse_units(amount, 9)
}

/// Parse a `0x`-prefixed hex quantity as returned by JSON-RPC.
pub fn parse_hex_quantity(value: &str) -> Result<BigUint, MoneyError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(BigUint::ZERO);
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| MoneyError::InvalidFormat(value.to_string()))
}

/// Render a quantity as a `0x`-prefixed hex string for JSON-RPC.
pub fn to_hex_quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(
            parse_units("0.01", 18).unwrap(),
            BigUint::from(10_000_000_000_000_000u64)
        );
        assert_eq!(parse_units("1", 6).unwrap(), BigUint::from(1_000_000u32));
        assert_eq!(parse_units(".5", 1).unwrap(), BigUint::from(5u32));
        assert_eq!(parse_units("0", 18).unwrap(), BigUint::ZERO);
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert_eq!(
            parse_units("1.234", 2),
            Err(MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            })
        );
        assert!(matches!(
            parse_units("-1", 18),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_units("", 18),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_units("1e5", 18),
            Err(MoneyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_format_units() {
        let wei = BigUint::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_units(&wei, 18), "1.5");
        assert_eq!(format_units(&BigUint::from(42u32), 0), "42");
        assert_eq!(format_units(&BigUint::from(1u32), 3), "0.001");
        assert_eq!(format_units(&BigUint::ZERO, 18), "0");
    }

    #[test]
    fn test_gwei() {
        assert_eq!(gwei("30").unwrap(), BigUint::from(30_000_000_000u64));
        assert_eq!(gwei("1.5").unwrap(), BigUint::from(1_500_000_000u64));
    }

    #[test]
    fn test_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x5208").unwrap(), BigUint::from(21000u32));
        assert_eq!(parse_hex_quantity("0x").unwrap(), BigUint::ZERO);
        assert!(parse_hex_quantity("0xzz").is_err());
        assert_eq!(to_hex_quantity(&BigUint::from(21000u32)), "0x5208");
        assert_eq!(to_hex_quantity(&BigUint::ZERO), "0x0");
    }
}
