use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PRESENT: &str = "Present";

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Parses `"June 2020"`. Month names are matched case-insensitively.
    pub fn parse_month_year(text: &str) -> Result<Self, DurationError> {
        let unparseable = || DurationError::UnparseableDate(text.to_string());

        let mut parts = text.split_whitespace();
        let (Some(month_name), Some(year_raw), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(unparseable());
        };

        let month = MONTH_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(month_name))
            .ok_or_else(unparseable)?;
        let year = year_raw.parse::<i32>().map_err(|_| unparseable())?;

        Ok(Self {
            year,
            month: month as u32 + 1,
        })
    }

    /// Parses the `YYYY-MM` form accepted by `--today`.
    pub fn parse_iso(text: &str) -> Result<Self> {
        let (year_raw, month_raw) = text
            .trim()
            .split_once('-')
            .with_context(|| format!("expected YYYY-MM, got {text:?}"))?;
        let year = year_raw
            .parse::<i32>()
            .with_context(|| format!("invalid year in {text:?}"))?;
        let month = month_raw
            .parse::<u32>()
            .with_context(|| format!("invalid month in {text:?}"))?;
        Self::new(year, month).with_context(|| format!("month out of range in {text:?}"))
    }

    fn month_index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn next_month(self) -> Option<Self> {
        if self.month == 12 {
            Some(Self {
                year: self.year.checked_add(1)?,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = MONTH_NAMES
            .get(self.month.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("?");
        write!(f, "{} {}", name, self.year)
    }
}

/// Source of "now" for open-ended ranges.
pub trait Clock {
    fn current_month(&self) -> YearMonth;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn current_month(&self) -> YearMonth {
        let today = Local::now().date_naive();
        YearMonth {
            year: today.year(),
            month: today.month(),
        }
    }
}

pub struct FixedClock(pub YearMonth);

impl Clock for FixedClock {
    fn current_month(&self) -> YearMonth {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("unparseable month-year value: {0:?}")]
    UnparseableDate(String),
    #[error("end {end} precedes start {start}")]
    EndBeforeStart { start: YearMonth, end: YearMonth },
    #[error("span from {start:?} to {end:?} is out of range")]
    OutOfRange { start: String, end: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Duration {
    pub years: u32,
    pub months: u32,
}

impl Duration {
    pub fn from_months(total_months: u32) -> Self {
        Self {
            years: total_months / 12,
            months: total_months % 12,
        }
    }

    pub fn total_months(self) -> u64 {
        u64::from(self.years) * 12 + u64::from(self.months)
    }

    /// Clamps to the largest representable span.
    fn saturating_from_months(total_months: u64) -> Self {
        Self::from_months(u32::try_from(total_months).unwrap_or(u32::MAX))
    }

    /// Parses the `"X years Y months"` presentation form. Returns `None` when
    /// no `<number> <unit>` pair is recognized or the total overflows.
    pub fn parse_text(text: &str) -> Option<Self> {
        let tokens = text.split_whitespace().collect::<Vec<&str>>();
        let mut total_months = 0u32;
        let mut recognized = false;

        for pair in tokens.chunks(2) {
            let [amount, unit] = pair else {
                continue;
            };
            let Ok(amount) = amount.parse::<u32>() else {
                continue;
            };
            let unit = unit.to_ascii_lowercase();
            let months = if unit.starts_with("year") {
                amount.checked_mul(12)?
            } else if unit.starts_with("month") {
                amount
            } else {
                continue;
            };
            total_months = total_months.checked_add(months)?;
            recognized = true;
        }

        recognized.then(|| Self::from_months(total_months))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::saturating_from_months(self.total_months() + rhs.total_months())
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Duration>>(iter: I) -> Duration {
        iter.fold(Duration::default(), Add::add)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year_suffix = if self.years == 1 { "" } else { "s" };
        write!(f, "{} year{}", self.years, year_suffix)?;
        if self.months > 0 {
            let month_suffix = if self.months == 1 { "" } else { "s" };
            write!(f, " {} month{}", self.months, month_suffix)?;
        }
        Ok(())
    }
}

/// Inclusive duration between two `"Month Year"` values. A closed range counts
/// its end month as worked; `"Present"` resolves to the clock's current month
/// without that extra month.
pub fn try_duration(start: &str, end: &str, clock: &dyn Clock) -> Result<Duration, DurationError> {
    let out_of_range = || DurationError::OutOfRange {
        start: start.to_string(),
        end: end.to_string(),
    };

    let start_month = YearMonth::parse_month_year(start)?;
    let end_exclusive = if end.trim().eq_ignore_ascii_case(PRESENT) {
        clock.current_month()
    } else {
        YearMonth::parse_month_year(end)?
            .next_month()
            .ok_or_else(out_of_range)?
    };

    let total_months = end_exclusive.month_index() - start_month.month_index();
    if total_months < 0 {
        return Err(DurationError::EndBeforeStart {
            start: start_month,
            end: end_exclusive,
        });
    }

    let total_months = u32::try_from(total_months).map_err(|_| out_of_range())?;
    Ok(Duration::from_months(total_months))
}

pub fn calculate_duration(start: &str, end: &str, clock: &dyn Clock) -> Option<Duration> {
    try_duration(start, end, clock).ok()
}

/// Sums presentation strings, skipping any that do not parse.
pub fn sum_duration_texts<'a, I>(texts: I) -> Duration
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().filter_map(Duration::parse_text).sum()
}
