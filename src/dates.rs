use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};
use regex::Regex;

use crate::error::GridnotesError;

static LEGACY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}[a-zA-Z]{3}[0-9]{4}").expect("static regex"));
static ISO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}").expect("static regex"));

/// The two date-string formats reports have used for their run columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `07Jan2012`, optionally followed by a suffix such as `.94`.
    Legacy,
    /// `2012-01-07`, optionally followed by `_11-48-47` or `_1148`.
    Iso,
}

impl DateFormat {
    fn pattern(&self) -> &'static str {
        match self {
            Self::Legacy => "%d%b%Y",
            Self::Iso => "%Y-%m-%d",
        }
    }
}

/// Calendar date of a run column, remembering the format it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestDate {
    format: DateFormat,
    date: NaiveDate,
}

impl TestDate {
    /// Parse the calendar part of a run date string. Any time-of-day or
    /// build suffix is ignored.
    pub fn parse(s: &str) -> Result<Self, GridnotesError> {
        let (format, prefix) = if let Some(m) = LEGACY_PREFIX.find(s) {
            (DateFormat::Legacy, m.as_str())
        } else if let Some(m) = ISO_PREFIX.find(s) {
            (DateFormat::Iso, m.as_str())
        } else {
            return Err(GridnotesError::InvalidDate(s.to_string()));
        };
        let date = NaiveDate::parse_from_str(prefix, format.pattern())
            .map_err(|_| GridnotesError::InvalidDate(s.to_string()))?;
        Ok(Self { format, date })
    }

    pub fn new(format: DateFormat, date: NaiveDate) -> Self {
        Self { format, date }
    }

    pub fn format(&self) -> DateFormat {
        self.format
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Same calendar date rendered in another format.
    pub fn with_format(&self, format: DateFormat) -> Self {
        Self {
            format,
            date: self.date,
        }
    }

    pub fn to_date_string(&self) -> String {
        self.date.format(self.format.pattern()).to_string()
    }

    /// One calendar day earlier. Saturates at the earliest representable date.
    pub fn previous_day(&self) -> Self {
        Self {
            format: self.format,
            date: self.date.checked_sub_days(Days::new(1)).unwrap_or(self.date),
        }
    }

    pub fn weekday_name(&self) -> &'static str {
        match self.date.weekday() {
            chrono::Weekday::Mon => "Monday",
            chrono::Weekday::Tue => "Tuesday",
            chrono::Weekday::Wed => "Wednesday",
            chrono::Weekday::Thu => "Thursday",
            chrono::Weekday::Fri => "Friday",
            chrono::Weekday::Sat => "Saturday",
            chrono::Weekday::Sun => "Sunday",
        }
    }
}

/// Short author timestamp, e.g. `07 Jan 2012 11:48`.
pub fn short_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%d %b %Y %H:%M").to_string()
}
