//! Look-ahead contamination tests for every transform.
//!
//! Invariant: no output value at quarter t may depend on input data from t+1
//! or later.
//!
//! Method: apply on truncated inputs (first 40 quarters) and full inputs
//! (80 quarters). Assert the first 40 outputs are identical between both
//! runs. Any difference means the transform reads future data.

use macropanel_core::period::{Quarter, QuarterRange};
use macropanel_core::series::Series;
use macropanel_core::transform::{create_transform, Term, Transform, TransformSpec};

const FULL: usize = 80;
const TRUNCATED: usize = 40;

/// Deterministic positive series with occasional nulls.
fn make_series(name: &str, seed: u64, n: usize) -> Series {
    let start = Quarter::new(1960, 1).unwrap();
    let mut level = 100.0;
    Series::from_points(
        name,
        (0..n).map(|i| {
            let s = (i as u64 ^ seed).wrapping_mul(6364136223846793005).wrapping_add(1);
            let change = ((s >> 33) % 200) as f64 / 100.0 - 1.0; // -1.0 to +0.99
            level = (level + change).max(1.0);
            let value = if s % 17 == 0 { None } else { Some(level) };
            (start.offset(i as i64), value)
        }),
    )
}

fn assert_no_lookahead(transform: &dyn Transform) {
    let full_inputs: Vec<Series> = transform
        .inputs()
        .iter()
        .enumerate()
        .map(|(k, name)| make_series(name, k as u64 + 7, FULL))
        .collect();
    let cutoff = QuarterRange::new(
        Quarter::new(1960, 1).unwrap(),
        Quarter::new(1960, 1).unwrap().offset(TRUNCATED as i64 - 1),
    )
    .unwrap();
    let truncated_inputs: Vec<Series> = full_inputs.iter().map(|s| s.slice(cutoff)).collect();

    let full_refs: Vec<&Series> = full_inputs.iter().collect();
    let trunc_refs: Vec<&Series> = truncated_inputs.iter().collect();
    let full = transform.apply(&full_refs).unwrap();
    let truncated = transform.apply(&trunc_refs).unwrap();

    assert_eq!(truncated.len(), TRUNCATED, "{}: truncated length", transform.name());
    assert_eq!(full.len(), FULL, "{}: full length", transform.name());

    for t in cutoff.iter() {
        assert_eq!(
            truncated.get(t),
            full.get(t),
            "{}: value at {t} changed when future quarters were added",
            transform.name()
        );
    }
}

fn all_specs() -> Vec<TransformSpec> {
    vec![
        TransformSpec::Identity { input: "a".into() },
        TransformSpec::Scale {
            input: "a".into(),
            factor: 0.001,
        },
        TransformSpec::PercentGrowth { input: "a".into() },
        TransformSpec::LogDifference { input: "a".into() },
        TransformSpec::Deflate {
            nominal: "a".into(),
            price_index: "b".into(),
        },
        TransformSpec::RatioToLag {
            flow: "a".into(),
            stock: "b".into(),
        },
        TransformSpec::Ratio {
            numerator: "a".into(),
            denominator: "b".into(),
            scale: 100.0,
        },
        TransformSpec::LinearCombination {
            terms: vec![Term::new("a", 1.0), Term::new("b", -1.0)],
        },
    ]
}

#[test]
fn no_transform_reads_the_future() {
    for spec in all_specs() {
        let transform = create_transform("out", &spec).unwrap();
        assert_no_lookahead(transform.as_ref());
    }
}

#[test]
fn lookback_matches_leading_nulls() {
    for spec in all_specs() {
        let transform = create_transform("out", &spec).unwrap();
        let inputs: Vec<Series> = transform
            .inputs()
            .iter()
            .map(|name| {
                let start = Quarter::new(1960, 1).unwrap();
                Series::from_points(name.clone(), (0..8).map(|i| (start.offset(i), Some(10.0 + i as f64))))
            })
            .collect();
        let refs: Vec<&Series> = inputs.iter().collect();
        let out = transform.apply(&refs).unwrap();
        let first_valid = out.first_valid_period().unwrap();
        assert_eq!(
            out.first_period().unwrap().quarters_until(first_valid),
            transform.lookback() as i64,
            "{}",
            spec.kind()
        );
    }
}
