//! Periodization: map native timestamps onto quarters (or years).

use super::provider::{DataError, RawObservation};
use crate::period::Quarter;
use crate::series::{Observation, Series};
use chrono::Datelike;
use std::collections::BTreeMap;

/// Map each observation to its enclosing quarter without aggregation.
///
/// Two observations landing in the same quarter is an error: callers of the
/// native-frequency path are expected to pre-aggregate (see `quarterly_mean`).
pub fn periodize(name: &str, raw: &[RawObservation]) -> Result<Series, DataError> {
    let observations = raw.iter().map(|o| Observation {
        period: Quarter::from_date(o.date),
        value: o.value,
    });
    Ok(Series::from_observations(name, observations)?)
}

/// Average all non-null observations within each quarter.
///
/// A quarter whose observations are all null stays in the index as null.
pub fn quarterly_mean(name: &str, raw: &[RawObservation]) -> Series {
    let mut buckets: BTreeMap<Quarter, (f64, usize)> = BTreeMap::new();
    for o in raw {
        let entry = buckets.entry(Quarter::from_date(o.date)).or_insert((0.0, 0));
        if let Some(v) = o.value {
            entry.0 += v;
            entry.1 += 1;
        }
    }
    Series::from_points(
        name,
        buckets
            .into_iter()
            .map(|(q, (sum, n))| (q, (n > 0).then(|| sum / n as f64))),
    )
}

/// Average all non-null observations within each calendar year.
///
/// Years without a single valid observation are dropped.
pub fn annual_mean(raw: &[RawObservation]) -> BTreeMap<i32, f64> {
    let mut buckets: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for o in raw {
        if let Some(v) = o.value {
            let entry = buckets.entry(o.date.year()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(year, (sum, n))| (year, sum / n as f64))
        .collect()
}
