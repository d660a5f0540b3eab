//! Fetch modes: one provider request, then periodization to quarters.

use super::periodize::{periodize, quarterly_mean};
use super::provider::{DataError, FetchRequest, Frequency, SeriesProvider};
use crate::series::Series;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How a provider series becomes a quarterly `Series`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchMode {
    /// Ask the provider for quarterly frequency and periodize its dates.
    #[default]
    Quarterly,
    /// Native frequency, strict periodization (one point per quarter).
    Native,
    /// Native frequency, averaged within each quarter.
    NativeMean,
}

impl FetchMode {
    pub fn frequency(&self) -> Frequency {
        match self {
            FetchMode::Quarterly => Frequency::Quarterly,
            FetchMode::Native | FetchMode::NativeMean => Frequency::Native,
        }
    }
}

/// Fetch one series and return it as a quarterly `Series` named `name`.
pub fn fetch_series(
    provider: &dyn SeriesProvider,
    series_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    mode: FetchMode,
    name: &str,
) -> Result<Series, DataError> {
    let mut request = FetchRequest::new(series_id, start).with_frequency(mode.frequency());
    if let Some(end) = end {
        request = request.until(end);
    }

    info!(provider = provider.name(), %request, ?mode, "fetching {name}");
    let raw = provider.fetch(&request)?;

    let series = match mode {
        FetchMode::Quarterly | FetchMode::Native => periodize(name, &raw)?,
        FetchMode::NativeMean => quarterly_mean(name, &raw),
    };

    if series.valid_count() == 0 {
        warn!(series_id, "{name}: no valid observations in the requested window");
    } else {
        info!(
            series_id,
            periods = series.len(),
            nulls = series.null_count(),
            "{name}: {}..={}",
            series.first_period().map(|q| q.to_string()).unwrap_or_default(),
            series.last_period().map(|q| q.to_string()).unwrap_or_default()
        );
    }
    Ok(series)
}

/// Provider-side quarterly fetch.
pub fn fetch_quarterly(
    provider: &dyn SeriesProvider,
    series_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    name: &str,
) -> Result<Series, DataError> {
    fetch_series(provider, series_id, start, end, FetchMode::Quarterly, name)
}

/// Native-frequency fetch with strict periodization.
pub fn fetch_native(
    provider: &dyn SeriesProvider,
    series_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    name: &str,
) -> Result<Series, DataError> {
    fetch_series(provider, series_id, start, end, FetchMode::Native, name)
}

/// Native-frequency fetch averaged within each quarter (monthly inputs).
pub fn fetch_native_mean(
    provider: &dyn SeriesProvider,
    series_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    name: &str,
) -> Result<Series, DataError> {
    fetch_series(provider, series_id, start, end, FetchMode::NativeMean, name)
}
