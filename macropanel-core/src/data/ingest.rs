use crate::period::{parse_period, Quarter};
use crate::series::{finite, Observation, Series};
use calamine::{open_workbook_auto, DataType as _, Reader as _};
use polars::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::provider::DataError;

/// Reader for manually curated input files (CSV, Parquet, or a spreadsheet).
///
/// One column holds the period, either as a quarter label (`1963Q1`) or a
/// date (`3/31/1962`); another holds the values. Everything else in the file
/// is ignored. Spreadsheets are read from their first sheet, with the first
/// row as the header.
pub struct FileIngestor<'a> {
    path: &'a Path,
}

impl<'a> FileIngestor<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }

    fn ingest_err(&self, e: impl std::fmt::Display) -> DataError {
        DataError::Ingest {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Read the whole file into a DataFrame, dispatching on extension.
    ///
    /// CSV columns are all read as text; numeric parsing happens per cell in
    /// [`Self::ingest_series`], so a stray sentinel deep in a column cannot
    /// fail the read.
    pub fn read_frame(&self) -> Result<DataFrame, DataError> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "txt" => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .try_into_reader_with_file_path(Some(self.path.to_path_buf()))
                .and_then(|reader| reader.finish())
                .map_err(|e| self.ingest_err(e)),
            "parquet" | "pq" => {
                let file = fs::File::open(self.path).map_err(|e| self.ingest_err(e))?;
                ParquetReader::new(file)
                    .finish()
                    .map_err(|e| DataError::Parquet(e.to_string()))
            }
            "xlsx" | "xlsm" | "xls" | "ods" => self.read_spreadsheet(),
            other => Err(self.ingest_err(format!("unsupported extension '.{other}'"))),
        }
    }

    /// First sheet of a workbook as a frame of text columns.
    ///
    /// Date cells are rendered as `YYYY-MM-DD`; empty and error cells are null.
    fn read_spreadsheet(&self) -> Result<DataFrame, DataError> {
        let mut workbook = open_workbook_auto(self.path).map_err(|e| self.ingest_err(e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| self.ingest_err("workbook has no sheets"))?
            .map_err(|e| self.ingest_err(e))?;

        let mut rows = range.rows();
        let header: Vec<String> = match rows.next() {
            Some(row) => row
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell_text(cell) {
                    Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                    _ => format!("column_{i}"),
                })
                .collect(),
            None => return Err(self.ingest_err("first sheet is empty")),
        };

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
        for row in rows {
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(row.get(i).and_then(cell_text));
            }
        }

        let columns: Vec<Column> = header
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::new(name.into(), values))
            .collect();
        DataFrame::new(columns).map_err(|e| self.ingest_err(e))
    }

    fn require_column<'df>(
        &self,
        df: &'df DataFrame,
        column: &str,
    ) -> Result<&'df Column, DataError> {
        df.column(column).map_err(|_| DataError::MissingColumn {
            column: column.to_string(),
            path: self.path.display().to_string(),
        })
    }

    /// Read one value column as a quarterly series named `name`.
    ///
    /// Rows whose period cannot be parsed are skipped with a warning; values
    /// that cannot be read as numbers become null. A period that appears
    /// twice is an error.
    pub fn ingest_series(
        &self,
        period_column: &str,
        value_column: &str,
        name: &str,
    ) -> Result<Series, DataError> {
        let df = self.read_frame()?;

        let periods = self
            .require_column(&df, period_column)?
            .cast(&DataType::String)
            .map_err(|e| self.ingest_err(e))?;
        let values = self
            .require_column(&df, value_column)?
            .cast(&DataType::Float64)
            .map_err(|e| self.ingest_err(e))?;

        let periods = periods.str().map_err(|e| self.ingest_err(e))?;
        let values = values.f64().map_err(|e| self.ingest_err(e))?;

        let mut observations = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for (period, value) in periods.into_iter().zip(values.into_iter()) {
            let period: Option<Quarter> = period.and_then(|p| parse_period(p).ok());
            match period {
                Some(period) => observations.push(Observation {
                    period,
                    value: value.and_then(finite),
                }),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped,
                "skipped rows with unparseable '{period_column}'"
            );
        }

        let series = Series::from_observations(name, observations)?;
        info!(
            path = %self.path.display(),
            periods = series.len(),
            nulls = series.null_count(),
            "ingested {name}"
        );
        Ok(series)
    }
}

fn cell_text(cell: &calamine::Data) -> Option<String> {
    match cell {
        calamine::Data::Empty | calamine::Data::Error(_) => None,
        calamine::Data::DateTime(_) | calamine::Data::DateTimeIso(_) => cell
            .as_date()
            .map(|date| date.format("%Y-%m-%d").to_string()),
        other => Some(other.to_string()),
    }
}

/// Convenience wrapper: read `value_column` of `path` as series `name`.
pub fn ingest_file(
    path: &Path,
    period_column: &str,
    value_column: &str,
    name: &str,
) -> Result<Series, DataError> {
    FileIngestor::new(path).ingest_series(period_column, value_column, name)
}
