use std::sync::LazyLock;

use chrono::{Days, Duration, NaiveDate, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};

static RE_HALF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-H([12])$").unwrap());
static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s*\.\.\s*(\d{4}-\d{2}-\d{2})$").unwrap()
});

/// Default trailing window shown when nothing has been selected.
pub const DEFAULT_REPORTING_RANGE_DAYS: u32 = 90;

/// Inclusive calendar-day window used as the baseline for control limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BaselineWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// A named calendar period that resolves to a baseline window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Half(i32, u8),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    /// The last N days ending on the anchor day.
    Rolling(u32, NaiveDate),
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Parse a period string. Rolling periods end on `anchor`, usually the
    /// last day of the series.
    ///
    /// Supported formats:
    /// - `2025` — year
    /// - `2025-H1` — half
    /// - `2025-Q1` — quarter
    /// - `2025-01` — month
    /// - `2025-W05` — ISO week
    /// - `30d` — rolling last N days
    /// - `2025-01-06..2025-02-14` — explicit inclusive range
    pub fn parse(s: &str, anchor: NaiveDate) -> Result<Self> {
        let s = s.trim();

        // Rolling: "30d", "7d", etc.
        if let Some(n) = s.strip_suffix(['d', 'D']) {
            if let Ok(n) = n.parse::<u32>() {
                if n == 0 {
                    return Err(Error::PeriodParse(format!("empty rolling period: {s}")));
                }
                return Ok(Period::Rolling(n, anchor));
            }
        }

        // Year: "2025"
        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        if let Some(caps) = RE_RANGE.captures(s) {
            let start = parse_day(&caps[1])?;
            let end = parse_day(&caps[2])?;
            if start > end {
                return Err(Error::PeriodParse(format!("range ends before it starts: {s}")));
            }
            return Ok(Period::Range(start, end));
        }

        if let Some(caps) = RE_HALF.captures(s) {
            return Ok(Period::Half(parse_num(&caps[1], s)?, parse_num(&caps[2], s)?));
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            return Ok(Period::Quarter(parse_num(&caps[1], s)?, parse_num(&caps[2], s)?));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = parse_num(&caps[1], s)?;
            let week: u8 = parse_num(&caps[2], s)?;
            if NaiveDate::from_isoywd_opt(year, week as u32, Weekday::Mon).is_some() {
                return Ok(Period::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = parse_num(&caps[1], s)?;
            let month: u8 = parse_num(&caps[2], s)?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Convert to a canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Half(y, h) => format!("{y}-H{h}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::Range(s, e) => format!("{s}..{e}"),
        }
    }

    /// The inclusive window this period covers.
    pub fn window(&self) -> Result<BaselineWindow> {
        let (start, end) = match self {
            Period::Year(y) => (ymd(*y, 1, 1)?, ymd(*y, 12, 31)?),
            Period::Half(y, 1) => (ymd(*y, 1, 1)?, ymd(*y, 6, 30)?),
            Period::Half(y, _) => (ymd(*y, 7, 1)?, ymd(*y, 12, 31)?),
            Period::Quarter(y, q) => {
                let start_month = (*q as u32 - 1) * 3 + 1;
                let end = last_day_of_month(*y, *q as u32 * 3).ok_or_else(|| out_of_range(self))?;
                (ymd(*y, start_month, 1)?, end)
            }
            Period::Month(y, m) => (
                ymd(*y, *m as u32, 1)?,
                last_day_of_month(*y, *m as u32).ok_or_else(|| out_of_range(self))?,
            ),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon)
                    .ok_or_else(|| out_of_range(self))?;
                (start, start + Duration::days(6))
            }
            Period::Rolling(n, anchor) => {
                let start = n
                    .checked_sub(1)
                    .and_then(|back| anchor.checked_sub_days(Days::new(u64::from(back))))
                    .ok_or_else(|| out_of_range(self))?;
                (start, *anchor)
            }
            Period::Range(s, e) => (*s, *e),
        };
        BaselineWindow::new(start, end)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// The trailing `days`-long window ending on `last`, clamped so it never
/// starts before `first`.
pub fn reporting_range(first: NaiveDate, last: NaiveDate, days: u32) -> Result<BaselineWindow> {
    let start = last.checked_sub_days(Days::new(u64::from(days))).unwrap_or(first);
    BaselineWindow::new(start.max(first).min(last), last)
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::PeriodParse(format!("invalid date {s}: {e}")))
}

fn parse_num<T: std::str::FromStr>(digits: &str, whole: &str) -> Result<T> {
    digits
        .parse()
        .map_err(|_| Error::PeriodParse(format!("invalid number in {whole}")))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::PeriodParse(format!("date out of range: {year}-{month:02}-{day:02}")))
}

fn out_of_range(period: &Period) -> Error {
    Error::PeriodParse(format!("period out of range: {period}"))
}
