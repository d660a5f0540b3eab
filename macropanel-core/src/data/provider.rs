//! Series provider trait and structured error types.
//!
//! The SeriesProvider trait abstracts over data sources (the FRED web API,
//! an in-memory fixture) so the pipeline can be run against synthetic data
//! in tests.

use crate::period::PeriodError;
use crate::series::SeriesError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One provider observation at its native timestamp, before periodization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl RawObservation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }
}

/// Structured error types for data operations.
///
/// Transport and response-shape errors are fatal for the run; per-value
/// parse problems never reach this type (they become null observations).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error fetching '{series_id}': {reason}")]
    Network { series_id: String, reason: String },

    #[error("HTTP {status} fetching '{series_id}': {message}")]
    Http {
        status: u16,
        series_id: String,
        message: String,
    },

    #[error("malformed response for '{series_id}': {reason}")]
    MalformedResponse { series_id: String, reason: String },

    #[error(transparent)]
    DuplicatePeriod(#[from] SeriesError),

    #[error("ingest failed for {path}: {reason}")]
    Ingest { path: String, reason: String },

    #[error("missing column '{column}' in {path}")]
    MissingColumn { column: String, path: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error(transparent)]
    Period(#[from] PeriodError),
}

/// Frequency requested from the provider.
///
/// `Native` sends no frequency parameter; the others ask the provider to
/// aggregate server-side with its own (opaque) rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    #[default]
    Native,
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    /// Provider frequency code, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Frequency::Native => None,
            Frequency::Monthly => Some("m"),
            Frequency::Quarterly => Some("q"),
            Frequency::Annual => Some("a"),
        }
    }
}

/// Parameters of one provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub series_id: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub frequency: Frequency,
}

impl FetchRequest {
    pub fn new(series_id: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            series_id: series_id.into(),
            start,
            end: None,
            frequency: Frequency::Native,
        }
    }

    pub fn until(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Whether `date` falls inside the requested window.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.series_id, self.start)?;
        if let Some(end) = self.end {
            write!(f, " to {end}")?;
        }
        if let Some(code) = self.frequency.code() {
            write!(f, " (frequency={code})")?;
        }
        Ok(())
    }
}

/// Trait for series providers.
///
/// One call is one blocking request/response. There is no caching and no
/// retry: callers treat any `Err` as fatal for the run.
pub trait SeriesProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch raw observations for one series over the request window.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawObservation>, DataError>;
}
