//! Integer money and percentage values.
//!
//! `Money` counts cents; `Percentage` counts hundredths of a percent.
//! Both round half-up at the last kept digit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

// =============================================================================
// MONEY
// =============================================================================

/// An amount of money in cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Money(i64);

impl Money {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create an amount from a number of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Parse a non-negative decimal amount such as `"1200"`, `"99.5"` or `"10.05"`.
    ///
    /// Returns `None` for negative values, more than two decimals, or anything
    /// that is not a plain decimal number.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

        if whole.is_empty() || !digits(whole) || !digits(frac) || frac.len() > 2 {
            return None;
        }
        if raw.ends_with('.') {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().ok()?.checked_mul(10)?,
            _ => frac.parse().ok()?,
        };
        whole.checked_mul(100)?.checked_add(frac_cents).map(Self)
    }

    /// Divide into `parts` equal shares, rounded half-up to the cent.
    ///
    /// Returns `None` when `parts` is zero or the amount is negative.
    #[must_use]
    pub fn divide_half_up(self, parts: u32) -> Option<Self> {
        if parts == 0 || self.0 < 0 {
            return None;
        }
        let parts = i64::from(parts);
        let doubled = self.0.checked_mul(2)?.checked_add(parts)?;
        Some(Self(doubled / (parts * 2)))
    }

    /// Multiply by a count, returning `None` on overflow.
    #[must_use]
    pub fn checked_times(self, count: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(count)).map(Self)
    }

    /// True when the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// PERCENTAGE
// =============================================================================

/// A percentage in hundredths of a percent (`6667` is 66.67%).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Percentage(u32);

/// `part / whole` scaled by `scale`, rounded half-up.
fn ratio_half_up(part: u64, whole: u64, scale: u64) -> Option<u32> {
    if whole == 0 {
        return None;
    }
    let numerator = part
        .saturating_mul(scale)
        .saturating_mul(2)
        .saturating_add(whole);
    let value = numerator / whole.saturating_mul(2);
    u32::try_from(value).ok()
}

/// Sub-units per hundredth of a percent when averaging unrounded shares.
const SHARE_PRECISION: u128 = 1_000_000_000_000;

impl Percentage {
    /// Zero percent.
    pub const ZERO: Self = Self(0);

    /// `part / whole × 100`, rounded half-up to two decimals.
    ///
    /// Returns `None` when `whole` is zero: nothing to aggregate.
    #[must_use]
    pub fn of(part: u64, whole: u64) -> Option<Self> {
        ratio_half_up(part, whole, 10_000).map(Self)
    }

    /// `part / whole × 100`, rounded half-up to one decimal.
    #[must_use]
    pub fn of_tenths(part: u64, whole: u64) -> Option<Self> {
        ratio_half_up(part, whole, 1_000).map(|tenths| Self(tenths.saturating_mul(10)))
    }

    /// Arithmetic mean of several percentages, rounded half-up.
    ///
    /// Returns `None` for an empty input.
    pub fn mean(values: impl IntoIterator<Item = Self>) -> Option<Self> {
        let (sum, count) = values
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), p| {
                (sum.saturating_add(u64::from(p.0)), count + 1)
            });
        ratio_half_up(sum, count, 1).map(Self)
    }

    /// Mean of several `part / whole` shares, rounded half-up only once.
    ///
    /// A share with a zero `whole` counts as zero. Returns `None` for an
    /// empty input.
    pub fn mean_of_shares(shares: impl IntoIterator<Item = (u64, u64)>) -> Option<Self> {
        let (sum, count) = shares
            .into_iter()
            .fold((0u128, 0u128), |(sum, count), (part, whole)| {
                let share = u128::from(part)
                    .saturating_mul(10_000 * SHARE_PRECISION)
                    .checked_div(u128::from(whole))
                    .unwrap_or(0);
                (sum.saturating_add(share), count + 1)
            });
        if count == 0 {
            return None;
        }
        let unit = count.saturating_mul(SHARE_PRECISION);
        let value = sum.saturating_mul(2).saturating_add(unit) / unit.saturating_mul(2);
        u32::try_from(value).ok().map(Self)
    }

    /// Raw value in hundredths of a percent.
    #[must_use]
    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Render with a single decimal (`"66.7"`).
    #[must_use]
    pub fn to_tenths_string(self) -> String {
        let tenths = self.0.saturating_add(5) / 10;
        format!("{}.{}", tenths / 10, tenths % 10)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_parse() {
        assert_eq!(Money::parse("1200"), Some(Money::from_cents(120_000)));
        assert_eq!(Money::parse("99.5"), Some(Money::from_cents(9_950)));
        assert_eq!(Money::parse(" 10.05 "), Some(Money::from_cents(1_005)));
        assert_eq!(Money::parse("0"), Some(Money::ZERO));
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        assert_eq!(Money::parse(""), None);
        assert_eq!(Money::parse("-5"), None);
        assert_eq!(Money::parse("1.234"), None);
        assert_eq!(Money::parse("12."), None);
        assert_eq!(Money::parse(".5"), None);
        assert_eq!(Money::parse("1,000"), None);
        assert_eq!(Money::parse("99999999999999999999"), None);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(123_456).to_string(), "1234.56");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_divide_half_up() {
        // 100.00 / 3 = 33.333.. -> 33.33
        assert_eq!(
            Money::from_cents(10_000).divide_half_up(3),
            Some(Money::from_cents(3_333))
        );
        // 0.05 / 2 = 0.025 -> 0.03
        assert_eq!(
            Money::from_cents(5).divide_half_up(2),
            Some(Money::from_cents(3))
        );
        assert_eq!(Money::from_cents(5).divide_half_up(0), None);
    }

    #[test]
    fn test_percentage_of() {
        assert_eq!(Percentage::of(2, 3).map(|p| p.to_string()), Some("66.67".into()));
        assert_eq!(Percentage::of(1, 8).map(|p| p.to_string()), Some("12.50".into()));
        assert_eq!(Percentage::of(3, 3).map(|p| p.hundredths()), Some(10_000));
        assert_eq!(Percentage::of(1, 0), None);
    }

    #[test]
    fn test_percentage_of_tenths() {
        let p = Percentage::of_tenths(2, 3).expect("ratio");
        assert_eq!(p.to_tenths_string(), "66.7");
        assert_eq!(p.hundredths(), 6_670);
    }

    #[test]
    fn test_percentage_mean() {
        let values = [Percentage(10_000), Percentage(5_000), Percentage(0)];
        assert_eq!(Percentage::mean(values), Some(Percentage(5_000)));
        assert_eq!(Percentage::mean(Vec::new()), None);
    }

    #[test]
    fn test_percentage_mean_of_shares_rounds_once() {
        // 66.666..% and 12.5% average to 39.5833..%; pre-rounded shares give 39.59
        assert_eq!(
            Percentage::mean_of_shares([(2, 3), (1, 8)]).map(|p| p.to_string()),
            Some("39.58".into())
        );
        assert_eq!(
            Percentage::mean_of_shares([(1, 1), (0, 0)]),
            Some(Percentage(5_000))
        );
        assert_eq!(Percentage::mean_of_shares(Vec::new()), None);
    }
}
