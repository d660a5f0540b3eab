//! Pass-through, scaling and weighted sums.
//!
//! Identity[t]          = x[t]
//! Scale[t]             = factor * x[t]
//! LinearCombination[t] = Σ weight_i * x_i[t]   (null if any term is null)
//!
//! The real interest rate is `TB3MS - CPIR`, i.e. weights `+1` and `-1`.

use super::{check_arity, union_periods, Transform, TransformError};
use crate::series::Series;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
    inputs: Vec<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: vec![input.into()],
        }
    }
}

impl Transform for Identity {
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
        Ok(inputs[0].renamed(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct Scale {
    name: String,
    inputs: Vec<String>,
    factor: f64,
}

impl Scale {
    pub fn new(name: impl Into<String>, input: impl Into<String>, factor: f64) -> Self {
        Self {
            name: name.into(),
            inputs: vec![input.into()],
            factor,
        }
    }
}

impl Transform for Scale {
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
        let x = inputs[0];
        Ok(Series::from_points(
            &self.name,
            x.periods().map(|t| (t, x.get(t).map(|v| self.factor * v))),
        ))
    }
}

/// One weighted input of a [`LinearCombination`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub input: String,
    pub weight: f64,
}

impl Term {
    pub fn new(input: impl Into<String>, weight: f64) -> Self {
        Self {
            input: input.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearCombination {
    name: String,
    inputs: Vec<String>,
    weights: Vec<f64>,
}

impl LinearCombination {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        let (inputs, weights) = terms.into_iter().map(|t| (t.input, t.weight)).unzip();
        Self {
            name: name.into(),
            inputs,
            weights,
        }
    }
}

impl Transform for LinearCombination {
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
        if inputs.is_empty() {
            return Err(TransformError::EmptyCombination {
                transform: self.name.clone(),
            });
        }
        let periods = union_periods(inputs);
        Ok(Series::from_points(
            &self.name,
            periods.into_iter().map(|t| {
                let value = inputs
                    .iter()
                    .zip(&self.weights)
                    .map(|(s, w)| s.get(t).map(|v| w * v))
                    .sum::<Option<f64>>();
                (t, value)
            }),
        ))
    }
}
