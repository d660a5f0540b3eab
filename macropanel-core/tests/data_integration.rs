//! Integration tests for the data path using frozen fixtures.
//!
//! The FRED fixture is a captured `series/observations` response; the manual
//! CSV mimics a hand-curated spreadsheet export with date-style periods.

use chrono::NaiveDate;
use std::path::PathBuf;
use macropanel_core::data::{
    fetch_quarterly, ingest_file, parse_observations, periodize, DataError, InMemoryProvider,
    RawObservation,
};
use macropanel_core::panel::assemble;
use macropanel_core::period::{Quarter, QuarterRange};
use macropanel_core::transform::{run_transforms, TransformSpec};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn q(s: &str) -> Quarter {
    s.parse().unwrap()
}

fn fred_fixture() -> Vec<RawObservation> {
    let body = std::fs::read_to_string(fixture_dir().join("fred_gdpc1.json")).unwrap();
    parse_observations("GDPC1", &body, ".").unwrap()
}

#[test]
fn frozen_fred_response_parses_with_sentinel() {
    let raw = fred_fixture();
    assert_eq!(raw.len(), 5);
    assert_eq!(raw[0].date, NaiveDate::from_ymd_opt(1961, 1, 1).unwrap());
    assert_eq!(raw[0].value, Some(3343.5));
    assert_eq!(raw[2].value, None);

    let series = periodize("GDPC1", &raw).unwrap();
    assert_eq!(series.first_period(), Some(q("1961Q1")));
    assert_eq!(series.last_period(), Some(q("1962Q1")));
    assert_eq!(series.null_count(), 1);
}

#[test]
fn real_gdp_growth_from_fixture() {
    let provider = InMemoryProvider::new().with_series("GDPC1", fred_fixture());
    let start = NaiveDate::from_ymd_opt(1961, 1, 1).unwrap();
    let gdp = fetch_quarterly(&provider, "GDPC1", start, None, "GDPC1").unwrap();

    let mut available = std::collections::BTreeMap::new();
    available.insert("GDPC1".to_string(), gdp);
    run_transforms(
        &[(
            "RGDP".to_string(),
            TransformSpec::PercentGrowth {
                input: "GDPC1".into(),
            },
        )],
        &mut available,
    )
    .unwrap();

    let rgdp = &available["RGDP"];
    let expected = 100.0 * (3404.1 / 3343.5 - 1.0);
    assert!((rgdp.get(q("1961Q2")).unwrap() - expected).abs() < 1e-9);
    // neighbours of the sentinel quarter are null
    assert_eq!(rgdp.get(q("1961Q3")), None);
    assert_eq!(rgdp.get(q("1961Q4")), None);
    assert!(rgdp.get(q("1962Q1")).is_some());
}

#[test]
fn manual_csv_ingests_date_periods() {
    let path = fixture_dir().join("tobq_manual.csv");
    let tobq = ingest_file(&path, "date", "tobq", "TOBQ").unwrap();

    assert_eq!(tobq.name(), "TOBQ");
    assert_eq!(tobq.len(), 4);
    assert_eq!(tobq.get(q("1962Q1")), Some(0.91));
    assert_eq!(tobq.get(q("1962Q3")), None);
    assert!(tobq.contains_period(q("1962Q3")));
}

#[test]
fn manual_workbook_ingests_date_cells_and_labels() {
    // first sheet: Quarter | TOBQ, date-formatted cells, one label row, one text value
    let path = fixture_dir().join("tobq_manual.xlsx");
    let tobq = ingest_file(&path, "Quarter", "TOBQ", "TOBQ").unwrap();

    assert_eq!(tobq.len(), 5);
    assert_eq!(tobq.get(q("1962Q1")), Some(0.91));
    assert_eq!(tobq.get(q("1962Q2")), Some(0.84));
    assert!(tobq.contains_period(q("1962Q3")));
    assert_eq!(tobq.get(q("1962Q3")), None);
    assert_eq!(tobq.get(q("1962Q4")), Some(0.88));
    assert!(tobq.contains_period(q("1963Q1")));
    assert_eq!(tobq.get(q("1963Q1")), None);
    assert_eq!(tobq.null_count(), 2);
}

#[test]
fn manual_workbook_missing_column_is_reported() {
    let path = fixture_dir().join("tobq_manual.xlsx");
    let err = ingest_file(&path, "Quarter", "LSOI", "LSOI").unwrap_err();
    assert!(matches!(err, DataError::MissingColumn { column, .. } if column == "LSOI"));
}

#[test]
fn manual_csv_missing_column_is_reported() {
    let path = fixture_dir().join("tobq_manual.csv");
    let err = ingest_file(&path, "date", "lsoi", "LSOI").unwrap_err();
    assert!(matches!(err, DataError::MissingColumn { column, .. } if column == "lsoi"));
}

#[test]
fn fetched_and_manual_series_share_one_panel() {
    let provider = InMemoryProvider::new().with_series("GDPC1", fred_fixture());
    let start = NaiveDate::from_ymd_opt(1961, 1, 1).unwrap();
    let gdp = fetch_quarterly(&provider, "GDPC1", start, None, "GDPC1").unwrap();
    let tobq = ingest_file(&fixture_dir().join("tobq_manual.csv"), "date", "tobq", "TOBQ").unwrap();

    let window = QuarterRange::new(q("1961Q3"), q("1962Q4")).unwrap();
    let panel = assemble(&[gdp, tobq], window).unwrap();

    assert_eq!(panel.index().first(), Some(&q("1961Q3")));
    assert_eq!(panel.index().last(), Some(&q("1962Q4")));
    assert_eq!(panel.row_count(), 6);
    // GDPC1 stops at 1962Q1; TOBQ starts at 1962Q1
    assert_eq!(panel.value("GDPC1", q("1962Q2")), None);
    assert_eq!(panel.value("TOBQ", q("1961Q4")), None);
    assert_eq!(panel.value("GDPC1", q("1962Q1")), Some(3631.5));
}
