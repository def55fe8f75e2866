use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tenure::{Clock, Duration, PRESENT, calculate_duration};

/// `<Month> <Year> - (<Month> <Year> | <word>)` as found in a detail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: Option<String>,
    pub trailing_status: Option<String>,
}

impl DateRange {
    /// Ranges without a closing month are open-ended.
    pub fn end_label(&self) -> &str {
        self.end.as_deref().unwrap_or(PRESENT)
    }

    pub fn duration(&self, clock: &dyn Clock) -> Option<Duration> {
        calculate_duration(&self.start, self.end_label(), clock)
    }
}

pub struct DateRangeParser {
    pattern: Regex,
}

impl DateRangeParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"(?i)([a-z]+\s\d{4})\s[-–—]\s(?:([a-z]+\s\d{4})|(\w+))",
        )
        .context("failed to compile date-range regex")?;
        Ok(Self { pattern })
    }

    pub fn find_all(&self, text: &str) -> Vec<DateRange> {
        self.pattern
            .captures_iter(text)
            .filter_map(|captures| {
                let start = captures.get(1)?.as_str().to_string();
                Some(DateRange {
                    start,
                    end: captures.get(2).map(|value| value.as_str().to_string()),
                    trailing_status: captures.get(3).map(|value| value.as_str().to_string()),
                })
            })
            .collect()
    }
}
