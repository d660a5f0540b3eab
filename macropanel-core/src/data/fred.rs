//! FRED series provider.
//!
//! Fetches observations from the `series/observations` endpoint as JSON.
//! One blocking GET per series; no retry and no caching. A transport error,
//! a non-2xx status or an undecodable body aborts the run. Individual values
//! that are missing, equal to the provider's sentinel (`"."`), or not numeric
//! become null observations.

use super::provider::{DataError, FetchRequest, RawObservation, SeriesProvider};
use crate::series::finite;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
pub const DEFAULT_SENTINEL: &str = ".";

/// Connection settings for the FRED API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FredConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. May be left empty in the file and supplied at run time.
    #[serde(default)]
    pub api_key: String,

    /// Literal the provider uses for a missing value.
    #[serde(default = "default_sentinel")]
    pub missing_sentinel: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for FredConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            missing_sentinel: default_sentinel(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `series/observations` response body. Only the fields we use.
#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Option<Vec<ObservationRecord>>,
}

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

/// Error body returned alongside a 4xx status.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_message: Option<String>,
}

/// Parse one `value` cell: sentinel, empty, or non-numeric text is null.
fn parse_value(value: Option<&serde_json::Value>, sentinel: &str) -> Option<f64> {
    match value? {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == sentinel {
                None
            } else {
                s.parse::<f64>().ok().and_then(finite)
            }
        }
        serde_json::Value::Number(n) => n.as_f64().and_then(finite),
        _ => None,
    }
}

/// Parse a `series/observations` JSON body into raw observations.
///
/// A body without an `observations` array is fatal. Records whose date
/// cannot be parsed are skipped; bad values become null.
pub fn parse_observations(
    series_id: &str,
    body: &str,
    sentinel: &str,
) -> Result<Vec<RawObservation>, DataError> {
    let resp: ObservationsResponse =
        serde_json::from_str(body).map_err(|e| DataError::MalformedResponse {
            series_id: series_id.to_string(),
            reason: format!("invalid JSON: {e}"),
        })?;

    let records = resp
        .observations
        .ok_or_else(|| DataError::MalformedResponse {
            series_id: series_id.to_string(),
            reason: "no 'observations' array".into(),
        })?;

    let mut observations = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in &records {
        let date = record
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
        let Some(date) = date else {
            skipped += 1;
            continue;
        };
        observations.push(RawObservation {
            date,
            value: parse_value(record.value.as_ref(), sentinel),
        });
    }

    if skipped > 0 {
        warn!(series_id, skipped, "skipped observations with unparseable dates");
    }
    if !observations.is_empty() && observations.iter().all(|o| o.value.is_none()) {
        warn!(series_id, "every observation is missing; series will be all-null");
    }

    Ok(observations)
}

/// FRED data provider.
pub struct FredProvider {
    client: reqwest::blocking::Client,
    config: FredConfig,
}

impl FredProvider {
    pub fn new(config: FredConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DataError::Network {
                series_id: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    /// Query parameters for a request. The API key is included.
    fn query_params(&self, request: &FetchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("series_id", request.series_id.clone()),
            ("api_key", self.config.api_key.clone()),
            ("file_type", "json".to_string()),
            ("observation_start", request.start.format("%Y-%m-%d").to_string()),
        ];
        if let Some(end) = request.end {
            params.push(("observation_end", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(code) = request.frequency.code() {
            params.push(("frequency", code.to_string()));
        }
        params
    }
}

impl SeriesProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawObservation>, DataError> {
        let series_id = request.series_id.as_str();
        debug!(%request, "GET {}", self.config.base_url);

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(request))
            .send()
            .map_err(|e| DataError::Network {
                series_id: series_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().map_err(|e| DataError::Network {
            series_id: series_id.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(DataError::Http {
                status: status.as_u16(),
                series_id: series_id.to_string(),
                message,
            });
        }

        parse_observations(series_id, &body, &self.config.missing_sentinel)
    }
}
