use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount")]
    Invalid,
    #[error("too many decimals")]
    TooManyDecimals,
    #[error("amount too large")]
    Overflow,
}

/// Signed money amount in integer **cents**.
///
/// The backend sends amounts as JSON numbers with two decimals; they are
/// converted here once so totals and formatting never drift.
///
/// ```rust
/// use dashboard::Money;
///
/// assert_eq!(Money::from_major(1250.5).cents(), 125_050);
/// assert_eq!(Money::new(123_456_78).to_string(), "123,456.78");
/// assert_eq!("10,5".parse::<Money>().unwrap().cents(), 1050);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Rounds a major-unit amount to the nearest cent.
    #[must_use]
    pub fn from_major(amount: f64) -> Self {
        Self((amount * 100.0).round() as i64)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Major units for the wire.
    #[must_use]
    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = (abs / 100).to_string();
        let cents = abs % 100;

        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{sign}{grouped}.{cents:02}")
    }
}

impl FromStr for Money {
    type Err = AmountError;

    /// Accepts `.` or `,` as decimal separator, an optional leading sign,
    /// and at most two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped.trim())
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped.trim())
        } else {
            (false, trimmed)
        };
        if rest.is_empty() {
            return Err(AmountError::Empty);
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let units_str = parts.next().ok_or(AmountError::Invalid)?;
        let cents_str = parts.next();
        if parts.next().is_some() {
            return Err(AmountError::Invalid);
        }
        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Invalid);
        }
        let units: i64 = units_str.parse().map_err(|_| AmountError::Overflow)?;

        let cents: i64 = match cents_str {
            None | Some("") => 0,
            Some(frac) if !frac.chars().all(|c| c.is_ascii_digit()) => {
                return Err(AmountError::Invalid);
            }
            Some(frac) if frac.len() == 1 => {
                frac.parse::<i64>().map_err(|_| AmountError::Invalid)? * 10
            }
            Some(frac) if frac.len() == 2 => frac.parse().map_err(|_| AmountError::Invalid)?,
            Some(_) => return Err(AmountError::TooManyDecimals),
        };

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or(AmountError::Overflow)?;
        Ok(Money(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_groups_thousands() {
        assert_eq!(Money::new(0).to_string(), "0.00");
        assert_eq!(Money::new(5).to_string(), "0.05");
        assert_eq!(Money::new(99_999).to_string(), "999.99");
        assert_eq!(Money::new(100_000).to_string(), "1,000.00");
        assert_eq!(Money::new(-125_050).to_string(), "-1,250.50");
    }

    #[test]
    fn from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(0.1 + 0.2).cents(), 30);
        assert_eq!(Money::from_major(-19.999).cents(), -2000);
        assert_eq!(Money::new(1050).to_major(), 10.5);
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Money>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<Money>().unwrap().cents(), 1050);
        assert_eq!("10,50".parse::<Money>().unwrap().cents(), 1050);
        assert_eq!("-0.01".parse::<Money>().unwrap().cents(), -1);
        assert_eq!(" +2.30 ".parse::<Money>().unwrap().cents(), 230);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<Money>(), Err(AmountError::Empty));
        assert_eq!("12.345".parse::<Money>(), Err(AmountError::TooManyDecimals));
        assert_eq!("1.2.3".parse::<Money>(), Err(AmountError::Invalid));
        assert_eq!("abc".parse::<Money>(), Err(AmountError::Invalid));
    }
}
