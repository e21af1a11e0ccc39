//! Fixed-point exchange rates
//!
//! A `FixedPoint32` is a `u64` with 32 fractional bits, so it covers
//! `[0, 2^32)` with a resolution of `2^-32`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unsigned fixed-point number with 32 integer and 32 fractional bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixedPoint32 {
    value: u64,
}

impl FixedPoint32 {
    /// Create from the raw 32.32 representation
    pub fn from_raw_value(value: u64) -> Self {
        Self { value }
    }

    /// Raw 32.32 representation
    pub fn raw_value(&self) -> u64 {
        self.value
    }

    /// `numerator / denominator`, rounded down
    ///
    /// Fails on a zero denominator, if the quotient does not fit, or if a
    /// non-zero ratio would round to zero.
    pub fn from_rational(numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::InvalidArgument("zero denominator".to_string()));
        }
        let scaled_numerator = (numerator as u128) << 64;
        let scaled_denominator = (denominator as u128) << 32;
        let quotient = scaled_numerator / scaled_denominator;

        if quotient == 0 && numerator != 0 {
            return Err(Error::InvalidArgument(format!(
                "ratio {}/{} is too small to represent",
                numerator, denominator
            )));
        }
        let value = u64::try_from(quotient).map_err(|_| {
            Error::Overflow(format!("ratio {}/{} is too large", numerator, denominator))
        })?;

        Ok(Self { value })
    }

    /// `value * self`, truncating the fractional part of the product
    pub fn multiply_u64(&self, value: u64) -> Result<u64> {
        let product = ((value as u128) * (self.value as u128)) >> 32;
        u64::try_from(product)
            .map_err(|_| Error::Overflow(format!("{} * {} does not fit in u64", value, self)))
    }

    /// Whether the rate is zero
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

impl fmt::Display for FixedPoint32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.value as f64 / (1u64 << 32) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rational() {
        let one = FixedPoint32::from_rational(1, 1).unwrap();
        assert_eq!(one.raw_value(), 1u64 << 32);

        let half = FixedPoint32::from_rational(1, 2).unwrap();
        assert_eq!(half.raw_value(), 1u64 << 31);
    }

    #[test]
    fn test_from_rational_errors() {
        assert!(matches!(
            FixedPoint32::from_rational(1, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            FixedPoint32::from_rational(1, u64::MAX),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            FixedPoint32::from_rational(u64::MAX, 1),
            Err(Error::Overflow(_))
        ));
        assert!(FixedPoint32::from_rational(0, 7).unwrap().is_zero());
    }

    #[test]
    fn test_multiply() {
        let half = FixedPoint32::from_rational(1, 2).unwrap();
        assert_eq!(half.multiply_u64(1001).unwrap(), 500);

        let three = FixedPoint32::from_rational(3, 1).unwrap();
        assert_eq!(three.multiply_u64(7).unwrap(), 21);
        assert!(three.multiply_u64(u64::MAX).is_err());
    }

    #[test]
    fn test_display() {
        let rate = FixedPoint32::from_rational(5, 2).unwrap();
        assert_eq!(rate.to_string(), "2.500000");
    }
}
