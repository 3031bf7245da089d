use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// A currency amount rounded to cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn to_cents(self) -> i64 {
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|c| c.round().to_i64())
            .unwrap_or(0)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Clamps at the largest or smallest representable amount.
    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    /// Shortest decimal rendering without trailing zeros (`-4.5`, `120`).
    /// Used wherever the amount becomes part of a key.
    pub fn to_plain_string(self) -> String {
        self.0.normalize().to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            write!(f, "-${:.2}", self.0.abs())
        } else {
            write!(f, "${:.2}", self.0)
        }
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money::from_decimal)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::from_decimal(value)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(12345).to_cents(), 12345);
        assert_eq!(Money::from_cents(-450).to_cents(), -450);
    }

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::from_str("10.005").unwrap());
        assert_eq!(m.to_cents(), 1000);
    }

    #[test]
    fn display_formats_sign_outside_symbol() {
        assert_eq!(Money::from_cents(450).to_string(), "$4.50");
        assert_eq!(Money::from_cents(-12000).to_string(), "-$120.00");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn plain_string_drops_trailing_zeros() {
        assert_eq!(Money::from_cents(-450).to_plain_string(), "-4.5");
        assert_eq!(Money::from_cents(12000).to_plain_string(), "120");
        assert_eq!(Money::zero().to_plain_string(), "0");
    }

    #[test]
    fn parse_and_arithmetic() {
        let a: Money = "4.50".parse().unwrap();
        let b: Money = "0.50".parse().unwrap();
        assert_eq!((a + b).to_cents(), 500);
        assert_eq!((a - b).to_cents(), 400);
        assert_eq!((-a).to_cents(), -450);
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let max = Money::from_decimal(Decimal::MAX);
        let one = Money::from_cents(100);
        assert_eq!(max.checked_add(one), None);
        assert_eq!((-max).checked_sub(one), None);
        assert_eq!(one.checked_sub(one), Some(Money::zero()));
        assert_eq!(max.saturating_add(one), max);
        assert_eq!(max.to_cents(), 0);
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [100, 250, -50].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.to_cents(), 300);
    }
}
