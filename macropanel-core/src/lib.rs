//! Macropanel Core: quarter calendar, series fetching, transforms, panel assembly.
//!
//! This crate holds the data path of the pipeline:
//! - Quarter periods and nullable quarterly series
//! - Series providers (FRED over HTTP, in-memory for tests) and file ingest
//! - Transform layer: growth, deflation, ratios, linear combinations
//! - Panel assembly over an analysis window, with CSV/Parquet persistence

pub mod data;
pub mod panel;
pub mod period;
pub mod series;
pub mod transform;
