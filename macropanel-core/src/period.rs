//! Calendar quarters, the time index used throughout the panel.
//!
//! A `Quarter` is `(year, quarter)` with December year-end. Any native
//! timestamp maps to exactly one quarter (periodization).

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("quarter number must be 1-4, got {0}")]
    InvalidQuarter(u8),

    #[error("cannot parse '{0}' as a quarter or a date")]
    Unparseable(String),

    #[error("empty window: {end} is before {start}")]
    EmptyWindow { start: Quarter, end: Quarter },
}

/// A calendar quarter, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    quarter: u8,
}

impl Quarter {
    pub fn new(year: i32, quarter: u8) -> Result<Self, PeriodError> {
        if !(1..=4).contains(&quarter) {
            return Err(PeriodError::InvalidQuarter(quarter));
        }
        Ok(Self { year, quarter })
    }

    /// Periodize a date: the quarter that contains it.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month0() / 3) + 1) as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    pub fn first_day(&self) -> NaiveDate {
        let month = u32::from(self.quarter - 1) * 3 + 1;
        NaiveDate::from_ymd_opt(self.year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.succ()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Index counting quarters from year 0 Q1; used for offsets and distances.
    fn ordinal(&self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(4) as i32,
            quarter: (ordinal.rem_euclid(4) + 1) as u8,
        }
    }

    pub fn offset(&self, quarters: i64) -> Self {
        Self::from_ordinal(self.ordinal() + quarters)
    }

    pub fn succ(&self) -> Self {
        self.offset(1)
    }

    pub fn pred(&self) -> Self {
        self.offset(-1)
    }

    /// Signed number of quarters from `self` to `other`.
    pub fn quarters_until(&self, other: Quarter) -> i64 {
        other.ordinal() - self.ordinal()
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Quarter {
    type Err = PeriodError;

    /// Accepts `1963Q1`, `1963q1`, `1963-Q1` and `1963 Q1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let (year, quarter) = upper
            .split_once('Q')
            .ok_or_else(|| PeriodError::Unparseable(trimmed.to_string()))?;
        let year = year.trim_end_matches(['-', ' ']);
        let year: i32 = year
            .parse()
            .map_err(|_| PeriodError::Unparseable(trimmed.to_string()))?;
        let quarter: u8 = quarter
            .parse()
            .map_err(|_| PeriodError::Unparseable(trimmed.to_string()))?;
        Quarter::new(year, quarter)
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a period cell from an input file.
///
/// Quarter labels are tried first; otherwise the text is parsed as a date
/// (or datetime) and periodized.
pub fn parse_period(text: &str) -> Result<Quarter, PeriodError> {
    let text = text.trim();
    if let Ok(q) = text.parse::<Quarter>() {
        return Ok(q);
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Ok(Quarter::from_date(date));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(Quarter::from_date(dt.date()));
        }
    }
    Err(PeriodError::Unparseable(text.to_string()))
}

/// Closed interval of quarters `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuarterRange {
    start: Quarter,
    end: Quarter,
}

impl QuarterRange {
    pub fn new(start: Quarter, end: Quarter) -> Result<Self, PeriodError> {
        if end < start {
            return Err(PeriodError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Quarter {
        self.start
    }

    pub fn end(&self) -> Quarter {
        self.end
    }

    pub fn contains(&self, q: Quarter) -> bool {
        self.start <= q && q <= self.end
    }

    pub fn len(&self) -> usize {
        (self.start.quarters_until(self.end) + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = Quarter> {
        let start = self.start;
        (0..self.len() as i64).map(move |i| start.offset(i))
    }
}

impl fmt::Display for QuarterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
