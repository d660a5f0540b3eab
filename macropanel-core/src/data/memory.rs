//! In-memory series provider for tests and offline runs.

use super::provider::{DataError, FetchRequest, Frequency, RawObservation, SeriesProvider};
use std::cell::RefCell;
use std::collections::HashMap;

/// Serves pre-registered observations, filtered to the request window.
///
/// The provider records every request it receives so tests can assert on
/// fetch order and parameters. Frequency is recorded but not applied: the
/// registered observations are returned as they are.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, Vec<RawObservation>>,
    requests: RefCell<Vec<FetchRequest>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register observations for a series id, replacing any previous ones.
    pub fn insert(&mut self, series_id: impl Into<String>, observations: Vec<RawObservation>) {
        self.series.insert(series_id.into(), observations);
    }

    pub fn with_series(
        mut self,
        series_id: impl Into<String>,
        observations: Vec<RawObservation>,
    ) -> Self {
        self.insert(series_id, observations);
        self
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.borrow().clone()
    }

    /// Frequencies requested for a series id, in order.
    pub fn frequencies_for(&self, series_id: &str) -> Vec<Frequency> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.series_id == series_id)
            .map(|r| r.frequency)
            .collect()
    }
}

impl SeriesProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawObservation>, DataError> {
        self.requests.borrow_mut().push(request.clone());

        let observations = self
            .series
            .get(&request.series_id)
            .ok_or_else(|| DataError::Http {
                status: 400,
                series_id: request.series_id.clone(),
                message: "The series does not exist.".into(),
            })?;

        Ok(observations
            .iter()
            .filter(|o| request.covers(o.date))
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn filters_to_window_and_records_requests() {
        let provider = InMemoryProvider::new().with_series(
            "GDPC1",
            vec![
                RawObservation::new(d(1960, 10), Some(1.0)),
                RawObservation::new(d(1961, 1), Some(2.0)),
                RawObservation::new(d(1961, 4), Some(3.0)),
            ],
        );

        let req = FetchRequest::new("GDPC1", d(1961, 1))
            .until(d(1961, 3))
            .with_frequency(Frequency::Quarterly);
        let obs = provider.fetch(&req).unwrap();

        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].value, Some(2.0));
        assert_eq!(provider.requests(), vec![req]);
        assert_eq!(provider.frequencies_for("GDPC1"), vec![Frequency::Quarterly]);
    }

    #[test]
    fn unknown_series_is_an_http_error() {
        let provider = InMemoryProvider::new();
        let err = provider
            .fetch(&FetchRequest::new("NOPE", d(2000, 1)))
            .unwrap_err();
        assert!(matches!(err, DataError::Http { status: 400, .. }));
    }
}
