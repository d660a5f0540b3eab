//! Series fetching: provider trait, FRED client, periodization, file ingest

pub mod fetch;
pub mod fred;
pub mod ingest;
pub mod memory;
pub mod periodize;
pub mod provider;

pub use fetch::{fetch_native, fetch_native_mean, fetch_quarterly, fetch_series, FetchMode};
pub use fred::{parse_observations, FredConfig, FredProvider};
pub use ingest::{ingest_file, FileIngestor};
pub use memory::InMemoryProvider;
pub use periodize::{annual_mean, periodize, quarterly_mean};
pub use provider::{DataError, FetchRequest, Frequency, RawObservation, SeriesProvider};
