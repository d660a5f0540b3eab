//! Period-over-period growth.
//!
//! PercentGrowth[t] = 100 * (x[t] / x[t-1] - 1)
//! LogDifference[t] = 100 * (ln x[t] - ln x[t-1])
//! Lookback: 1. The first quarter of the input is kept in the index as null;
//! fetch one extra leading quarter so the analysis window is fully populated.

use super::{check_arity, Transform, TransformError};
use crate::series::Series;

/// Apply `f(x[t-1], x[t])` over the input's index.
fn lagged_map(name: &str, x: &Series, f: impl Fn(f64, f64) -> f64) -> Series {
    Series::from_points(
        name,
        x.periods().map(|t| {
            let value = match (x.get(t.pred()), x.get(t)) {
                (Some(prev), Some(curr)) => Some(f(prev, curr)),
                _ => None,
            };
            (t, value)
        }),
    )
}

#[derive(Debug, Clone)]
pub struct PercentGrowth {
    name: String,
    inputs: Vec<String>,
}

impl PercentGrowth {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: vec![input.into()],
        }
    }
}

impl Transform for PercentGrowth {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn lookback(&self) -> usize {
        1
    }

    fn apply(&self, inputs: &[&Series]) -> Result<Series, TransformError> {
        check_arity(self, inputs)?;
        Ok(lagged_map(&self.name, inputs[0], |prev, curr| {
            100.0 * (curr / prev - 1.0)
        }))
    }
}

#[derive(Debug, Clone)]
pub struct LogDifference {
    name: String,
    inputs: Vec<String>,
}

impl LogDifference {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: vec![input.into()],
        }
    }
}

impl Transform for LogDifference {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn lookback(&self) -> usize {
        1
    }

    fn apply(&self, inputs: &[&Series]) -> Result<Series, TransformError> {
        check_arity(self, inputs)?;
        Ok(lagged_map(&self.name, inputs[0], |prev, curr| {
            100.0 * (curr.ln() - prev.ln())
        }))
    }
}
