//! # Property-Based Tests
//!
//! Arithmetic invariants of installment splitting and attendance percentages.

use chrono::{Datelike, NaiveDate};
use proptest::collection::vec;
use proptest::prelude::*;
use sis_core::fees::{due_date, split_installments};
use sis_core::{Money, Percentage};

// =============================================================================
// INSTALLMENTS
// =============================================================================

proptest! {
    /// A successful split has one amount per month and sums to the total.
    #[test]
    fn split_sums_to_total(cents in 1i64..=9_999_999_999, months in 1u32..=120) {
        let total = Money::from_cents(cents);
        if let Some(amounts) = split_installments(total, months) {
            prop_assert_eq!(amounts.len(), months as usize);
            let sum: Money = amounts.iter().copied().sum();
            prop_assert_eq!(sum, total);
            prop_assert!(amounts.iter().all(|a| !a.is_negative()));
        }
    }

    /// Every installment but the last equals the half-up monthly share.
    #[test]
    fn leading_installments_are_equal(cents in 1i64..=9_999_999_999, months in 2u32..=120) {
        let total = Money::from_cents(cents);
        let monthly = total.divide_half_up(months).expect("positive months");
        if let Some(amounts) = split_installments(total, months) {
            let (_, leading) = amounts.split_last().expect("non-empty");
            prop_assert!(leading.iter().all(|a| *a == monthly));
        }
    }

    /// A split is refused exactly when the last installment would go negative.
    #[test]
    fn split_refused_only_when_last_negative(cents in 1i64..=1_000_000, months in 1u32..=120) {
        let total = Money::from_cents(cents);
        let monthly = total.divide_half_up(months).expect("positive months");
        let leading = monthly.cents() * i64::from(months - 1);
        prop_assert_eq!(split_installments(total, months).is_some(), leading <= cents);
    }

    /// Due dates advance one calendar month each and never overshoot the start day.
    #[test]
    fn due_dates_follow_months(day in 1u32..=31, seq in 1u32..=120) {
        let start = NaiveDate::from_ymd_opt(2024, 1, day).expect("january day");
        let due = due_date(start, seq).expect("in range");
        let months_apart =
            (due.year() - start.year()) * 12 + due.month() as i32 - start.month() as i32;
        prop_assert_eq!(months_apart, seq as i32 - 1);
        prop_assert!(due.day() <= start.day());
    }
}

// =============================================================================
// PERCENTAGES
// =============================================================================

proptest! {
    /// `of` never exceeds 100% and hits it exactly when everything is present.
    #[test]
    fn percentage_bounded(whole in 1u64..10_000, part_seed in 0u64..10_000) {
        let part = part_seed % (whole + 1);
        let pct = Percentage::of(part, whole).expect("non-zero whole");
        prop_assert!(pct.hundredths() <= 10_000);
        prop_assert_eq!(pct.hundredths() == 10_000, part == whole);
        prop_assert_eq!(Percentage::of(whole, whole).expect("whole").hundredths(), 10_000);
    }

    /// One-decimal rounding differs from two-decimal rounding by at most 0.05%.
    #[test]
    fn tenths_close_to_hundredths(whole in 1u64..10_000, part_seed in 0u64..10_000) {
        let part = part_seed % (whole + 1);
        let fine = Percentage::of(part, whole).expect("non-zero whole").hundredths();
        let coarse = Percentage::of_tenths(part, whole).expect("non-zero whole").hundredths();
        prop_assert_eq!(coarse % 10, 0);
        prop_assert!(fine.abs_diff(coarse) <= 5);
    }

    /// The mean lies between the smallest and largest value.
    #[test]
    fn mean_within_bounds(values in vec(0u64..=10_000, 1..40)) {
        let percentages: Vec<Percentage> = values
            .iter()
            .map(|v| Percentage::of(*v, 10_000).expect("non-zero whole"))
            .collect();
        let mean = Percentage::mean(percentages.iter().copied()).expect("non-empty");
        let min = percentages.iter().min().expect("non-empty");
        let max = percentages.iter().max().expect("non-empty");
        prop_assert!(*min <= mean && mean <= *max);
    }
}

#[test]
fn empty_aggregates_are_none() {
    assert!(Percentage::of(0, 0).is_none());
    assert!(Percentage::mean(Vec::new()).is_none());
    assert!(split_installments(Money::from_cents(100), 0).is_none());
}
