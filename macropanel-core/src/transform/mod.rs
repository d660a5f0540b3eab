//! Transform layer: per-series domain arithmetic.
//!
//! Every transform is a pure function from one or more quarterly series to
//! one new series. "Previous period" always means the calendar predecessor
//! (`t.pred()`), never the previous row, so sparse inputs cannot shift
//! values across a gap. Division by zero, a null operand, or a log of a
//! non-positive number yields a null cell, never an error.
//!
//! # Look-ahead guard
//! No output value at quarter t may depend on input data from t+1 or later.
//! Every transform must pass the truncated-vs-full series test.

pub mod combine;
pub mod deflate;
pub mod growth;
pub mod ratio;

pub use combine::{Identity, LinearCombination, Scale, Term};
pub use deflate::Deflate;
pub use growth::{LogDifference, PercentGrowth};
pub use ratio::{Ratio, RatioToLag};

use crate::period::Quarter;
use crate::series::Series;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{transform}: expected {expected} input series, got {got}")]
    Arity {
        transform: String,
        expected: usize,
        got: usize,
    },

    #[error("{transform}: input series '{input}' is not available (undefined or defined later)")]
    MissingInput { transform: String, input: String },

    #[error("{transform}: a linear combination needs at least one term")]
    EmptyCombination { transform: String },
}

/// Trait for transforms.
///
/// `inputs()` names the series `apply` expects, in order. `lookback()` is the
/// number of leading quarters consumed before the first defined output.
pub trait Transform: Send + Sync {
    /// Output series name.
    fn name(&self) -> &str;

    /// Input series names, in the order `apply` expects them.
    fn inputs(&self) -> &[String];

    /// Quarters of history needed before the first defined output.
    fn lookback(&self) -> usize;

    /// Compute the output series.
    fn apply(&self, inputs: &[&Series]) -> Result<Series, TransformError>;
}

/// Check the number of inputs handed to `apply`.
pub(crate) fn check_arity(t: &dyn Transform, inputs: &[&Series]) -> Result<(), TransformError> {
    if inputs.len() != t.inputs().len() {
        return Err(TransformError::Arity {
            transform: t.name().to_string(),
            expected: t.inputs().len(),
            got: inputs.len(),
        });
    }
    Ok(())
}

/// Union of all periods present in any input.
pub(crate) fn union_periods(inputs: &[&Series]) -> BTreeSet<Quarter> {
    inputs.iter().flat_map(|s| s.periods()).collect()
}

/// Declarative transform specification, as written in pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformSpec {
    /// Pass a series through under a new name.
    Identity { input: String },

    /// Unit conversion: `factor * x[t]`.
    Scale { input: String, factor: f64 },

    /// `100 * (x[t] / x[t-1] - 1)`.
    PercentGrowth { input: String },

    /// `100 * (ln x[t] - ln x[t-1])`.
    LogDifference { input: String },

    /// `nominal[t] / (price_index[t] / 100)`.
    Deflate { nominal: String, price_index: String },

    /// `(flow[t] - flow[t-1]) / stock[t-1]`.
    RatioToLag { flow: String, stock: String },

    /// `scale * numerator[t] / denominator[t]`.
    Ratio {
        numerator: String,
        denominator: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },

    /// `Σ weight_i * input_i[t]`.
    LinearCombination { terms: Vec<Term> },
}

fn default_scale() -> f64 {
    1.0
}

impl TransformSpec {
    /// Input series names referenced by this spec.
    pub fn inputs(&self) -> Vec<String> {
        match self {
            TransformSpec::Identity { input }
            | TransformSpec::Scale { input, .. }
            | TransformSpec::PercentGrowth { input }
            | TransformSpec::LogDifference { input } => vec![input.clone()],
            TransformSpec::Deflate {
                nominal,
                price_index,
            } => vec![nominal.clone(), price_index.clone()],
            TransformSpec::RatioToLag { flow, stock } => vec![flow.clone(), stock.clone()],
            TransformSpec::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.clone(), denominator.clone()],
            TransformSpec::LinearCombination { terms } => {
                terms.iter().map(|t| t.input.clone()).collect()
            }
        }
    }

    /// Leading quarters this step consumes.
    pub fn lookback(&self) -> usize {
        match self {
            TransformSpec::PercentGrowth { .. }
            | TransformSpec::LogDifference { .. }
            | TransformSpec::RatioToLag { .. } => 1,
            _ => 0,
        }
    }

    /// Short type label, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformSpec::Identity { .. } => "identity",
            TransformSpec::Scale { .. } => "scale",
            TransformSpec::PercentGrowth { .. } => "percent_growth",
            TransformSpec::LogDifference { .. } => "log_difference",
            TransformSpec::Deflate { .. } => "deflate",
            TransformSpec::RatioToLag { .. } => "ratio_to_lag",
            TransformSpec::Ratio { .. } => "ratio",
            TransformSpec::LinearCombination { .. } => "linear_combination",
        }
    }
}

/// Build the runtime transform for a spec, producing series `name`.
pub fn create_transform(
    name: &str,
    spec: &TransformSpec,
) -> Result<Box<dyn Transform>, TransformError> {
    let t: Box<dyn Transform> = match spec {
        TransformSpec::Identity { input } => Box::new(Identity::new(name, input)),
        TransformSpec::Scale { input, factor } => Box::new(Scale::new(name, input, *factor)),
        TransformSpec::PercentGrowth { input } => Box::new(PercentGrowth::new(name, input)),
        TransformSpec::LogDifference { input } => Box::new(LogDifference::new(name, input)),
        TransformSpec::Deflate {
            nominal,
            price_index,
        } => Box::new(Deflate::new(name, nominal, price_index)),
        TransformSpec::RatioToLag { flow, stock } => Box::new(RatioToLag::new(name, flow, stock)),
        TransformSpec::Ratio {
            numerator,
            denominator,
            scale,
        } => Box::new(Ratio::new(name, numerator, denominator, *scale)),
        TransformSpec::LinearCombination { terms } => {
            if terms.is_empty() {
                return Err(TransformError::EmptyCombination {
                    transform: name.to_string(),
                });
            }
            Box::new(LinearCombination::new(name, terms.clone()))
        }
    };
    Ok(t)
}

/// Look up a transform's inputs by name and apply it.
pub fn apply_named(
    transform: &dyn Transform,
    available: &BTreeMap<String, Series>,
) -> Result<Series, TransformError> {
    let inputs = transform
        .inputs()
        .iter()
        .map(|name| {
            available
                .get(name)
                .ok_or_else(|| TransformError::MissingInput {
                    transform: transform.name().to_string(),
                    input: name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    transform.apply(&inputs)
}

/// Run a list of `(output name, spec)` steps in order.
///
/// Each step may read fetched series and the outputs of earlier steps only.
/// Outputs are added to `available` as they are produced.
pub fn run_transforms(
    steps: &[(String, TransformSpec)],
    available: &mut BTreeMap<String, Series>,
) -> Result<(), TransformError> {
    for (name, spec) in steps {
        let transform = create_transform(name, spec)?;
        let output = apply_named(transform.as_ref(), available)?;
        info!(
            transform = spec.kind(),
            inputs = ?transform.inputs(),
            periods = output.len(),
            nulls = output.null_count(),
            "derived {name}"
        );
        available.insert(name.clone(), output);
    }
    Ok(())
}

/// Shared test helper: series from consecutive quarters starting at `start`.
#[cfg(test)]
pub(crate) fn make_series(name: &str, start: &str, values: &[Option<f64>]) -> Series {
    let start: Quarter = start.parse().unwrap();
    Series::from_points(
        name,
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start.offset(i as i64), *v)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_inputs_and_lookback() {
        let spec = TransformSpec::RatioToLag {
            flow: "profits_real".into(),
            stock: "inv_real".into(),
        };
        assert_eq!(spec.inputs(), vec!["profits_real", "inv_real"]);
        assert_eq!(spec.lookback(), 1);

        let spec = TransformSpec::Deflate {
            nominal: "profits_nom".into(),
            price_index: "gdpdef".into(),
        };
        assert_eq!(spec.lookback(), 0);
    }

    #[test]
    fn spec_deserializes_from_tagged_table() {
        let json = r#"{"type":"LINEAR_COMBINATION","terms":[
            {"input":"TB3MS","weight":1.0},{"input":"CPIR","weight":-1.0}]}"#;
        let spec: TransformSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.inputs(), vec!["TB3MS", "CPIR"]);

        let spec: TransformSpec =
            serde_json::from_str(r#"{"type":"RATIO","numerator":"a","denominator":"b"}"#).unwrap();
        assert_eq!(
            spec,
            TransformSpec::Ratio {
                numerator: "a".into(),
                denominator: "b".into(),
                scale: 1.0
            }
        );
    }

    #[test]
    fn run_transforms_chains_in_order() {
        let mut available = BTreeMap::new();
        available.insert(
            "GFCF".to_string(),
            make_series("GFCF", "1962Q1", &[Some(100.0), Some(110.0), Some(121.0)]),
        );
        let steps = vec![
            (
                "INVR".to_string(),
                TransformSpec::PercentGrowth {
                    input: "GFCF".into(),
                },
            ),
            (
                "INVR_x2".to_string(),
                TransformSpec::Scale {
                    input: "INVR".into(),
                    factor: 2.0,
                },
            ),
        ];
        run_transforms(&steps, &mut available).unwrap();
        let doubled = &available["INVR_x2"];
        assert_eq!(doubled.name(), "INVR_x2");
        let v = doubled.get("1962Q3".parse().unwrap()).unwrap();
        assert!((v - 20.0).abs() < 1e-9);
    }

    #[test]
    fn forward_reference_is_missing_input() {
        let mut available = BTreeMap::new();
        available.insert("A".to_string(), make_series("A", "1962Q1", &[Some(1.0)]));
        let steps = vec![
            (
                "B".to_string(),
                TransformSpec::Identity { input: "C".into() },
            ),
            (
                "C".to_string(),
                TransformSpec::Identity { input: "A".into() },
            ),
        ];
        let err = run_transforms(&steps, &mut available).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingInput {
                transform: "B".into(),
                input: "C".into()
            }
        );
    }

    #[test]
    fn empty_linear_combination_is_rejected() {
        let err = create_transform("X", &TransformSpec::LinearCombination { terms: vec![] })
            .err()
            .unwrap();
        assert!(matches!(err, TransformError::EmptyCombination { .. }));
    }

    #[test]
    fn arity_is_checked() {
        let t = create_transform(
            "RGDP",
            &TransformSpec::PercentGrowth {
                input: "GDPC1".into(),
            },
        )
        .unwrap();
        let a = make_series("a", "1962Q1", &[Some(1.0)]);
        let err = t.apply(&[&a, &a]).unwrap_err();
        assert!(matches!(err, TransformError::Arity { expected: 1, got: 2, .. }));
    }
}
