//! # Fixed-Point Decimal
//!
//! Non-negative decimal with 12 fractional digits stored in a `u128`.
//! Products and quotients go through `U256` so intermediates never overflow;
//! every operation truncates toward zero, which keeps results identical on
//! every replica.

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

pub const DEC_PRECISION: usize = 12;
const DEC_ONE: u128 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(u128);

impl Dec {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn one() -> Self {
        Self(DEC_ONE)
    }

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn from_int(value: u128) -> Self {
        Self(value * DEC_ONE)
    }

    /// `num / den`, zero when `den` is zero.
    pub fn from_ratio(num: u128, den: u128) -> Self {
        if den == 0 {
            return Self::zero();
        }
        Self(mul_div(num, DEC_ONE, den))
    }

    /// `pct` percent, e.g. `percent(5)` is 0.05.
    pub fn percent(pct: u128) -> Self {
        Self::from_ratio(pct, 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Dec) -> Option<Dec> {
        self.0.checked_sub(other.0).map(Dec)
    }

    pub fn saturating_sub(self, other: Dec) -> Dec {
        Dec(self.0.saturating_sub(other.0))
    }

    pub fn mul(self, other: Dec) -> Dec {
        Dec(mul_div(self.0, other.0, DEC_ONE))
    }

    pub fn mul_int(self, value: u128) -> Dec {
        Dec(self.0 * value)
    }

    /// `self / other`, zero when `other` is zero.
    pub fn quo(self, other: Dec) -> Dec {
        if other.is_zero() {
            return Dec::zero();
        }
        Dec(mul_div(self.0, DEC_ONE, other.0))
    }

    pub fn quo_int(self, value: u128) -> Dec {
        if value == 0 {
            return Dec::zero();
        }
        Dec(self.0 / value)
    }

    /// `self * num / den` with a single truncation.
    pub fn mul_ratio(self, num: Dec, den: Dec) -> Dec {
        if den.is_zero() {
            return Dec::zero();
        }
        Dec(mul_div(self.0, num.0, den.0))
    }

    /// Integer part.
    pub fn truncate(self) -> u128 {
        self.0 / DEC_ONE
    }

    pub fn is_integer(&self) -> bool {
        self.0 % DEC_ONE == 0
    }

    pub fn min(self, other: Dec) -> Dec {
        if self <= other {
            self
        } else {
            other
        }
    }
}

fn mul_div(a: u128, b: u128, den: u128) -> u128 {
    let wide = U256::from(a) * U256::from(b) / U256::from(den);
    wide.low_u128()
}

/// `a * b / den`, truncated, with the product held in 256 bits. `None` when
/// `den` is zero or the quotient does not fit in a `u128`.
pub fn checked_mul_div(a: u128, b: u128, den: u128) -> Option<u128> {
    if den == 0 {
        return None;
    }
    let wide = U256::from(a) * U256::from(b) / U256::from(den);
    (wide <= U256::from(u128::MAX)).then(|| wide.low_u128())
}

impl Add for Dec {
    type Output = Dec;

    fn add(self, other: Dec) -> Dec {
        Dec(self.0 + other.0)
    }
}

impl AddAssign for Dec {
    fn add_assign(&mut self, other: Dec) {
        self.0 += other.0;
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / DEC_ONE,
            self.0 % DEC_ONE,
            width = DEC_PRECISION
        )
    }
}

impl FromStr for Dec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() || frac_part.len() > DEC_PRECISION {
            return Err(format!("invalid decimal {s}"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(format!("invalid decimal {s}"));
        }
        let int: u128 = int_part
            .parse()
            .map_err(|e| format!("invalid decimal {s}: {e}"))?;
        let mut frac: u128 = 0;
        if !frac_part.is_empty() {
            frac = frac_part
                .parse()
                .map_err(|e| format!("invalid decimal {s}: {e}"))?;
            frac *= 10u128.pow((DEC_PRECISION - frac_part.len()) as u32);
        }
        int.checked_mul(DEC_ONE)
            .and_then(|v| v.checked_add(frac))
            .map(Dec)
            .ok_or_else(|| format!("decimal {s} out of range"))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let d: Dec = "1.5".parse().unwrap();
        assert_eq!(d.to_string(), "1.500000000000");
        assert_eq!("3".parse::<Dec>().unwrap(), Dec::from_int(3));
        assert!("1.2.3".parse::<Dec>().is_err());
        assert!(".5".parse::<Dec>().is_err());
        assert!("-1".parse::<Dec>().is_err());
    }

    #[test]
    fn test_ratio_truncates() {
        let third = Dec::from_ratio(1, 3);
        assert_eq!(third.raw(), 333_333_333_333);
        assert_eq!(Dec::from_ratio(1, 0), Dec::zero());
    }

    #[test]
    fn test_mul_ratio_avoids_overflow() {
        let big = Dec::from_int(10u128.pow(20));
        let half = big.mul_ratio(Dec::from_int(1), Dec::from_int(2));
        assert_eq!(half, Dec::from_int(5 * 10u128.pow(19)));
    }

    #[test]
    fn test_checked_mul_div() {
        assert_eq!(checked_mul_div(u128::MAX, 3, 4), Some(u128::MAX / 4 * 3 + 2));
        assert_eq!(checked_mul_div(u128::MAX, 2, 1), None);
        assert_eq!(checked_mul_div(7, 1, 0), None);
    }

    #[test]
    fn test_truncate_and_integer() {
        let d: Dec = "7.999".parse().unwrap();
        assert_eq!(d.truncate(), 7);
        assert!(!d.is_integer());
        assert!(Dec::from_int(4).is_integer());
    }

    #[test]
    fn test_checked_sub() {
        assert_eq!(Dec::one().checked_sub(Dec::from_int(2)), None);
        assert_eq!(Dec::from_int(2).checked_sub(Dec::one()), Some(Dec::one()));
    }
}
