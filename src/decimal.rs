//! Fixed-point credit amounts and fee rates.
//!
//! Uses `rust_decimal` internally with scale enforcement so balances never
//! pick up floating-point drift.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A credit amount with exactly 4 decimal places of precision.
///
/// Amounts are signed: the transaction log stores every record's `amount` as
/// the delta applied to the owning account.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use rewards_ledger::Credits;
///
/// let amount = Credits::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.5000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Credits(Decimal);

impl Credits {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    /// Zero value.
    pub const ZERO: Self = Credits(Decimal::ZERO);

    /// Largest magnitude an amount or balance may hold: 10^15 credits.
    pub const MAX: Self = Credits(Decimal::from_parts(0x89E8_0000, 0x8AC7_2304, 0, false, 4));

    /// Creates a new `Credits` from a `Decimal`, rounding to 4 decimal places.
    pub fn new(value: Decimal) -> Self {
        let mut normalized =
            value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        normalized.rescale(Self::SCALE);
        Credits(normalized)
    }

    /// Whole credit units.
    pub fn whole(units: i64) -> Self {
        Credits::new(Decimal::from(units))
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Credits(self.0.abs())
    }

    /// This amount multiplied by `count`, e.g. a per-page rate times pages.
    /// Saturates at [`Credits::MAX`].
    pub fn times(self, count: u32) -> Self {
        self.0
            .checked_mul(Decimal::from(count))
            .map(Credits::new)
            .filter(|c| c.abs() <= Credits::MAX)
            .unwrap_or(Credits::MAX)
    }

    /// `self + rhs`, or `None` if the result exceeds [`Credits::MAX`].
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).and_then(Credits::bounded)
    }

    /// `self - rhs`, or `None` if the result exceeds [`Credits::MAX`].
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).and_then(Credits::bounded)
    }

    fn bounded(value: Decimal) -> Option<Self> {
        if value.abs() > Credits::MAX.0 {
            None
        } else {
            Some(Credits::new(value))
        }
    }

    /// The share of this amount taken by `rate`, rounded to 4 places.
    pub fn portion(self, rate: FeeRate) -> Self {
        Credits::new(self.0 * rate.0)
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl FromStr for Credits {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed).map_err(|e| e.to_string())?;
        Credits::bounded(decimal)
            .ok_or_else(|| format!("{} exceeds the maximum of {}", trimmed, Credits::MAX))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Add for Credits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Credits::new(self.0 + rhs.0)
    }
}

impl AddAssign for Credits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Credits {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Credits::new(self.0 - rhs.0)
    }
}

impl SubAssign for Credits {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Neg for Credits {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Credits::ZERO - self
    }
}

impl Sum for Credits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Credits::ZERO, |acc, c| acc + c)
    }
}

impl<'a> Sum<&'a Credits> for Credits {
    fn sum<I: Iterator<Item = &'a Credits>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Credits {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:.4}", self.0))
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Credits::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A fraction in `[0, 1]` applied to a gross amount, e.g. a platform fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FeeRate(Decimal);

impl FeeRate {
    pub const ZERO: Self = FeeRate(Decimal::ZERO);

    /// Builds a rate, returning `None` outside `[0, 1]`.
    pub fn new(value: Decimal) -> Option<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            None
        } else {
            Some(FeeRate(value))
        }
    }

    /// `percent`% as a rate. Values above 100 saturate.
    pub fn percent(percent: u32) -> Self {
        FeeRate(Decimal::new(i64::from(percent.min(100)), 2))
    }

}

impl FromStr for FeeRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim()).map_err(|e| e.to_string())?;
        FeeRate::new(decimal).ok_or_else(|| format!("rate {} outside [0, 1]", decimal))
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for FeeRate {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FeeRate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FeeRate::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cr(s: &str) -> Credits {
        Credits::from_str(s).unwrap()
    }

    #[test]
    fn test_from_str_normalizes_scale() {
        assert_eq!(cr("1.0").to_string(), "1.0000");
        assert_eq!(cr("1.1234").to_string(), "1.1234");
        assert_eq!(cr("  2.5  ").to_string(), "2.5000");
    }

    #[test]
    fn test_excess_precision_rounds_away_from_zero() {
        assert_eq!(cr("0.00005").to_string(), "0.0001");
        assert_eq!(cr("0.00004").to_string(), "0.0000");
    }

    #[test]
    fn test_arithmetic_preserves_scale() {
        let a = cr("1.5");
        let b = cr("2.5");

        assert_eq!((a + b).to_string(), "4.0000");
        assert_eq!((b - a).to_string(), "1.0000");
        assert_eq!((a - b).to_string(), "-1.0000");
        assert_eq!((-a).to_string(), "-1.5000");
    }

    #[test]
    fn test_portion_computes_fee() {
        let gross = Credits::whole(50);
        assert_eq!(gross.portion(FeeRate::percent(2)), Credits::whole(1));
        assert_eq!(
            cr("33.33").portion(FeeRate::percent(5)).to_string(),
            "1.6665"
        );
        assert_eq!(gross.portion(FeeRate::ZERO), Credits::ZERO);
    }

    #[test]
    fn test_sign_helpers() {
        assert!(cr("0.0001").is_positive());
        assert!(cr("-0.0001").is_negative());
        assert!(!Credits::ZERO.is_positive());
        assert!(!Credits::ZERO.is_negative());
        assert_eq!(cr("-3").abs(), Credits::whole(3));
    }

    #[test]
    fn test_sum_and_times() {
        let total: Credits = [cr("1.25"), cr("2.75"), cr("-1")].iter().sum();
        assert_eq!(total, Credits::whole(3));
        assert_eq!(cr("0.5").times(7).to_string(), "3.5000");
    }

    #[test]
    fn test_magnitude_is_capped() {
        assert_eq!(Credits::MAX.to_string(), "1000000000000000.0000");
        assert_eq!(cr("1000000000000000"), Credits::MAX);
        assert!(Credits::from_str("1000000000000000.0001").is_err());
        assert!(Credits::from_str("-1000000000000000.0001").is_err());
        assert!(Credits::from_str("50000000000000000000000000000").is_err());
        assert!(Credits::from_str("999999999999999999999999999999999").is_err());
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(cr("1.5").checked_add(cr("2.5")), Some(Credits::whole(4)));
        assert_eq!(cr("1.5").checked_sub(cr("2.5")), Some(Credits::whole(-1)));
        assert_eq!(Credits::MAX.checked_add(cr("0.0001")), None);
        assert_eq!((-Credits::MAX).checked_sub(cr("0.0001")), None);
        assert_eq!(Credits::MAX.checked_sub(Credits::MAX), Some(Credits::ZERO));
        assert_eq!(Credits::MAX.times(u32::MAX), Credits::MAX);
    }

    #[test]
    fn test_fee_rate_bounds() {
        assert!(FeeRate::from_str("0.02").is_ok());
        assert!(FeeRate::from_str("1").is_ok());
        assert!(FeeRate::from_str("1.01").is_err());
        assert!(FeeRate::from_str("-0.1").is_err());
        assert!(FeeRate::from_str("abc").is_err());
        assert_eq!(FeeRate::percent(2).to_string(), "0.02");
    }
}
