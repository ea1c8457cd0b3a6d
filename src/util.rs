/*!
Miscellaneous calendar utilities for `stockcast`
*/

use chrono::{Datelike, Days, Duration, Months, NaiveDate};
use num::{Float, NumCast};

/// Nanoseconds in a day
const NS_PER_DAY: i64 = 86_400_000_000_000;

/// Convert a `chrono::Duration` to a floating point containing the number of nanoseconds
pub fn to_ns<F: Float>(dur: Duration) -> F {
    dur.num_nanoseconds()
        .and_then(|ns| <F as NumCast>::from(ns))
        .unwrap_or_else(F::max_value)
}

/// Convert a `chrono::Duration` to a floating point containing the number of days
pub fn to_days<F: Float>(dur: Duration) -> F {
    let ns_in_day: F = <F as NumCast>::from(NS_PER_DAY).unwrap_or_else(F::max_value);
    to_ns::<F>(dur) / ns_in_day
}

/// The same calendar day `years` years before `date`. Feb 29 maps to Feb 28 in non-leap years.
pub fn years_before(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    months_before(date, years.checked_mul(12)?)
}

/// The same calendar day `months` months before `date`, clamped to the end of shorter months
pub fn months_before(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months))
}

/// The `count` consecutive calendar days following `date`
pub fn days_after(date: NaiveDate, count: usize) -> Option<Vec<NaiveDate>> {
    (1..=count as u64)
        .map(|offset| date.checked_add_days(Days::new(offset)))
        .collect()
}

/// Whether `dates` is strictly increasing
pub fn strictly_increasing(dates: &[NaiveDate]) -> bool {
    dates.windows(2).all(|pair| pair[0] < pair[1])
}

/// Format a date the way tables are written out
pub fn fmt_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}
