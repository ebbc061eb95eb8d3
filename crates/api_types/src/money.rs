use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount")]
    Invalid,
    #[error("too many decimals")]
    TooManyDecimals,
    #[error("amount too large")]
    Overflow,
}

/// Ringgit amount represented as **integer sen**.
///
/// The server sends amounts as JSON numbers (sometimes as strings); they are
/// converted to sen on the way in so that totals never drift.
///
/// # Examples
///
/// ```rust
/// use api_types::Money;
///
/// let amount = Money::new(12_34);
/// assert_eq!(amount.sen(), 1234);
/// assert_eq!(amount.to_string(), "RM 12.34");
/// assert_eq!("10,5".parse::<Money>().unwrap().sen(), 1050);
/// assert!("12.345".parse::<Money>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a new amount from integer sen.
    #[must_use]
    pub const fn new(sen: i64) -> Self {
        Self(sen)
    }

    /// Returns the raw value in sen.
    #[must_use]
    pub const fn sen(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Plain decimal form without currency, e.g. `-12.30`.
    #[must_use]
    pub fn to_decimal_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    /// Converts a JSON float into sen, rounding half away from zero.
    pub fn from_f64(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::Invalid);
        }
        let sen = (value * 100.0).round();
        if sen.abs() > i64::MAX as f64 / 2.0 {
            return Err(MoneyError::Overflow);
        }
        Ok(Self(sen as i64))
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    #[must_use]
    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    #[must_use]
    pub fn saturating_sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}RM {}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// Operators saturate at the `i64` bounds; amounts come from the server.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = self.saturating_sub(rhs);
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    /// Parses a decimal string into sen.
    ///
    /// Accepts `.` or `,` as decimal separator, an optional leading `+`/`-`
    /// and an optional `RM` prefix. At most 2 fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Empty);
        }

        let (sign, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (-1i64, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (1i64, stripped)
        } else {
            (1i64, trimmed)
        };

        let rest = rest.trim();
        let rest = rest
            .strip_prefix("RM")
            .or_else(|| rest.strip_prefix("rm"))
            .unwrap_or(rest)
            .trim();
        if rest.is_empty() {
            return Err(MoneyError::Empty);
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let ringgit_str = parts.next().ok_or(MoneyError::Invalid)?;
        let sen_str = parts.next();

        if parts.next().is_some() {
            return Err(MoneyError::Invalid);
        }

        if ringgit_str.is_empty() || !ringgit_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyError::Invalid);
        }

        let ringgit: i64 = ringgit_str.parse().map_err(|_| MoneyError::Overflow)?;

        let sen: i64 = match sen_str {
            None | Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(MoneyError::Invalid);
                }
                match frac.len() {
                    1 => frac.parse::<i64>().map_err(|_| MoneyError::Invalid)? * 10,
                    2 => frac.parse::<i64>().map_err(|_| MoneyError::Invalid)?,
                    _ => return Err(MoneyError::TooManyDecimals),
                }
            }
        };

        let total = ringgit
            .checked_mul(100)
            .and_then(|v| v.checked_add(sen))
            .ok_or(MoneyError::Overflow)?;

        Ok(Money(sign * total))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_i64(self.0 / 100)
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl de::Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a ringgit amount as number or decimal string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(100)
                    .map(Money)
                    .ok_or_else(|| E::custom(MoneyError::Overflow))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(Money)
                    .ok_or_else(|| E::custom(MoneyError::Overflow))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                Money::from_f64(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_near_the_bounds() {
        let big = Money::new(i64::MAX - 1);
        assert_eq!(big.checked_add(Money::new(5)), None);
        assert_eq!(Money::new(i64::MIN).checked_sub(Money::new(1)), None);
        assert_eq!(big.checked_add(Money::new(1)), Some(Money::new(i64::MAX)));

        assert_eq!(big + big, Money::new(i64::MAX));
        assert_eq!(-big - big, Money::new(i64::MIN));
        assert_eq!(-Money::new(i64::MIN), Money::new(i64::MAX));
        assert_eq!(
            [big, big, Money::new(-10)].into_iter().sum::<Money>(),
            Money::new(i64::MAX - 10)
        );
    }

    #[test]
    fn display_formats_ringgit() {
        assert_eq!(Money::new(0).to_string(), "RM 0.00");
        assert_eq!(Money::new(5).to_string(), "RM 0.05");
        assert_eq!(Money::new(1050).to_string(), "RM 10.50");
        assert_eq!(Money::new(-1050).to_string(), "-RM 10.50");
        assert_eq!(Money::new(-1050).to_decimal_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_comma_and_prefix() {
        assert_eq!("10".parse::<Money>().unwrap().sen(), 1000);
        assert_eq!("10.5".parse::<Money>().unwrap().sen(), 1050);
        assert_eq!("10,50".parse::<Money>().unwrap().sen(), 1050);
        assert_eq!("RM 2.30".parse::<Money>().unwrap().sen(), 230);
        assert_eq!("-0.01".parse::<Money>().unwrap().sen(), -1);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("12.345".parse::<Money>(), Err(MoneyError::TooManyDecimals));
        assert_eq!("".parse::<Money>(), Err(MoneyError::Empty));
        assert_eq!("1.2.3".parse::<Money>(), Err(MoneyError::Invalid));
        assert_eq!("abc".parse::<Money>(), Err(MoneyError::Invalid));
    }

    #[test]
    fn json_numbers_become_sen() {
        let m: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(m.sen(), 1999);
        let m: Money = serde_json::from_str("7").unwrap();
        assert_eq!(m.sen(), 700);
        let m: Money = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(m.sen(), 10);
        assert_eq!(serde_json::to_string(&Money::new(700)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Money::new(1999)).unwrap(), "19.99");
    }
}
