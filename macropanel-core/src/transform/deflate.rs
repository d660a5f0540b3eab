//! Deflation by a price index.
//!
//! Real[t] = nominal[t] / (price_index[t] / 100), with the index based at 100.
//! Lookback: 0.

use super::{check_arity, union_periods, Transform, TransformError};
use crate::series::Series;

#[derive(Debug, Clone)]
pub struct Deflate {
    name: String,
    inputs: Vec<String>,
}

impl Deflate {
    pub fn new(
        name: impl Into<String>,
        nominal: impl Into<String>,
        price_index: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs: vec![nominal.into(), price_index.into()],
        }
    }
}

impl Transform for Deflate {
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
        let (nominal, price) = (inputs[0], inputs[1]);
        let periods = union_periods(inputs);
        Ok(Series::from_points(
            &self.name,
            periods.into_iter().map(|t| {
                let value = match (nominal.get(t), price.get(t)) {
                    (Some(n), Some(p)) => Some(n / (p / 100.0)),
                    _ => None,
                };
                (t, value)
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Quarter;
    use crate::transform::make_series;

    fn q(s: &str) -> Quarter {
        s.parse().unwrap()
    }

    #[test]
    fn deflate_by_index_of_110() {
        let nominal = make_series("profits_nom", "1962Q1", &[Some(110.0)]);
        let price = make_series("gdpdef", "1962Q1", &[Some(110.0)]);
        let real = Deflate::new("profits_real", "profits_nom", "gdpdef")
            .apply(&[&nominal, &price])
            .unwrap();
        let v = real.get(q("1962Q1")).unwrap();
        assert!((v - 100.0).abs() < 1e-9, "got {v}");
    }

    #[test]
    fn misaligned_periods_produce_null_not_dropped_rows() {
        let nominal = make_series("n", "1962Q1", &[Some(50.0), Some(60.0)]);
        let price = make_series("p", "1962Q2", &[Some(100.0), Some(120.0)]);
        let real = Deflate::new("r", "n", "p").apply(&[&nominal, &price]).unwrap();

        assert_eq!(real.len(), 3);
        assert_eq!(real.get(q("1962Q1")), None);
        assert_eq!(real.get(q("1962Q2")), Some(60.0));
        assert!(real.contains_period(q("1962Q3")));
        assert_eq!(real.get(q("1962Q3")), None);
    }

    #[test]
    fn zero_price_index_is_null() {
        let nominal = make_series("n", "1962Q1", &[Some(50.0)]);
        let price = make_series("p", "1962Q1", &[Some(0.0)]);
        let real = Deflate::new("r", "n", "p").apply(&[&nominal, &price]).unwrap();
        assert_eq!(real.get(q("1962Q1")), None);
        assert_eq!(real.null_count(), 1);
    }
}
