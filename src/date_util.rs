use chrono::{DateTime, Duration, FixedOffset, NaiveDate};

/// Seconds since the Unix epoch, as stamped by the upstream tracker.
pub type EpochSeconds = i64;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Day difference between two instants.
///
/// `exact` is the fractional value used in comparisons and limit math;
/// `rounded` is floored and only meant for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayDiff {
    pub exact: f64,
    pub rounded: i64,
}

/// Days elapsed from `start` to `end`, negative when `end` precedes `start`.
/// Defined for every pair of stamps; `rounded` saturates at the `i64` bounds.
pub fn days_between(start: EpochSeconds, end: EpochSeconds) -> DayDiff {
    let exact = (i128::from(end) - i128::from(start)) as f64 / SECONDS_PER_DAY;
    DayDiff {
        exact,
        rounded: exact.floor() as i64,
    }
}

/// Calendar day of an epoch timestamp in the given offset.
/// Returns `None` for timestamps chrono cannot represent.
pub fn day_of(ts: EpochSeconds, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&offset).date_naive())
}

/// Every calendar day from `start` to `end`, both inclusive.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next.map(|d| d - Duration::days(1))
}
