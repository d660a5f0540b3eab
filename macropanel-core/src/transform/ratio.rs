//! Ratios between series.
//!
//! RatioToLag[t] = (flow[t] - flow[t-1]) / stock[t-1]   (lookback 1)
//! Ratio[t]      = scale * numerator[t] / denominator[t] (lookback 0)
//!
//! RatioToLag is the incremental rate construction: the change in a real
//! flow over the previous quarter's real stock. Only the stock is lagged;
//! the flow's first difference ends at t.

use super::{check_arity, union_periods, Transform, TransformError};
use crate::series::Series;

#[derive(Debug, Clone)]
pub struct RatioToLag {
    name: String,
    inputs: Vec<String>,
}

impl RatioToLag {
    pub fn new(name: impl Into<String>, flow: impl Into<String>, stock: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: vec![flow.into(), stock.into()],
        }
    }
}

impl Transform for RatioToLag {
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
        let (flow, stock) = (inputs[0], inputs[1]);
        let periods = union_periods(inputs);
        Ok(Series::from_points(
            &self.name,
            periods.into_iter().map(|t| {
                let prev = t.pred();
                let value = match (flow.get(t), flow.get(prev), stock.get(prev)) {
                    (Some(x), Some(x_prev), Some(y_prev)) => Some((x - x_prev) / y_prev),
                    _ => None,
                };
                (t, value)
            }),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct Ratio {
    name: String,
    inputs: Vec<String>,
    scale: f64,
}

impl Ratio {
    pub fn new(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        scale: f64,
    ) -> Self {
        Self {
            name: name.into(),
            inputs: vec![numerator.into(), denominator.into()],
            scale,
        }
    }
}

impl Transform for Ratio {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn lookback(&self) -> usize {
        0
    }

    fn apply(&self, inputs: &[&Series]) -> Result<Series, TransformError> {
        check_arity(self, inputs)?;
        let (num, den) = (inputs[0], inputs[1]);
        let periods = union_periods(inputs);
        Ok(Series::from_points(
            &self.name,
            periods.into_iter().map(|t| {
                let value = match (num.get(t), den.get(t)) {
                    (Some(a), Some(b)) => Some(self.scale * a / b),
                    _ => None,
                };
                (t, value)
            }),
        ))
    }
}
