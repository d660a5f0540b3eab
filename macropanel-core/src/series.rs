//! Named, quarter-indexed series of nullable values.
//!
//! A `Series` is immutable once built: transforms read one or more series and
//! produce a new one. Non-finite values (NaN, ±inf) are stored as null so
//! that division by zero or a missing lag never surfaces as a number.

use crate::period::{Quarter, QuarterRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One `(period, value)` pair. `None` is a missing observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub period: Quarter,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series '{series}' has more than one observation for {period}")]
    DuplicatePeriod { series: String, period: Quarter },
}

/// Normalize a raw number: non-finite becomes null.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    name: String,
    points: BTreeMap<Quarter, Option<f64>>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
        }
    }

    /// Build from observations, rejecting a period that appears twice.
    pub fn from_observations(
        name: impl Into<String>,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<Self, SeriesError> {
        let name = name.into();
        let mut points = BTreeMap::new();
        for obs in observations {
            let value = obs.value.and_then(finite);
            if points.insert(obs.period, value).is_some() {
                return Err(SeriesError::DuplicatePeriod {
                    series: name,
                    period: obs.period,
                });
            }
        }
        Ok(Self { name, points })
    }

    /// Build from `(period, value)` pairs. A repeated period keeps the last
    /// value; use `from_observations` when duplicates must be rejected.
    pub fn from_points(
        name: impl Into<String>,
        points: impl IntoIterator<Item = (Quarter, Option<f64>)>,
    ) -> Self {
        Self {
            name: name.into(),
            points: points
                .into_iter()
                .map(|(q, v)| (q, v.and_then(finite)))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of this series under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: self.points.clone(),
        }
    }

    /// Value at `period`; `None` when absent or null.
    pub fn get(&self, period: Quarter) -> Option<f64> {
        self.points.get(&period).copied().flatten()
    }

    pub fn contains_period(&self, period: Quarter) -> bool {
        self.points.contains_key(&period)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_period(&self) -> Option<Quarter> {
        self.points.keys().next().copied()
    }

    pub fn last_period(&self) -> Option<Quarter> {
        self.points.keys().next_back().copied()
    }

    /// First period carrying a non-null value.
    pub fn first_valid_period(&self) -> Option<Quarter> {
        self.points
            .iter()
            .find(|(_, v)| v.is_some())
            .map(|(q, _)| *q)
    }

    pub fn periods(&self) -> impl Iterator<Item = Quarter> + '_ {
        self.points.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.points.values().copied()
    }

    pub fn observations(&self) -> impl Iterator<Item = Observation> + '_ {
        self.points.iter().map(|(&period, &value)| Observation { period, value })
    }

    pub fn null_count(&self) -> usize {
        self.points.values().filter(|v| v.is_none()).count()
    }

    pub fn valid_count(&self) -> usize {
        self.len() - self.null_count()
    }

    /// Restrict to the periods inside `range`.
    pub fn slice(&self, range: QuarterRange) -> Self {
        Self {
            name: self.name.clone(),
            points: self
                .points
                .range(range.start()..=range.end())
                .map(|(q, v)| (*q, *v))
                .collect(),
        }
    }
}
