//! Panel assembly: align named series onto one quarterly index.
//!
//! The index is the union of every input's periods restricted to the analysis
//! window. A series with no observation at an index period gets a null cell;
//! nothing is forward-filled or interpolated.

pub mod io;

pub use io::{is_panel_format, read_csv, read_panel, read_parquet, write_csv, write_panel, write_parquet, write_series_csv};

use crate::period::{Quarter, QuarterRange};
use crate::series::Series;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("column '{0}' appears more than once in the panel")]
    DuplicateColumn(String),

    #[error("column '{column}' has {got} values but the index has {expected} periods")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("panel index is not strictly increasing at {0}")]
    UnorderedIndex(Quarter),

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed panel file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("unsupported panel format '{0}' (expected .csv or .parquet)")]
    UnsupportedFormat(String),
}

/// One named column of nullable values, aligned with the panel index.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl PanelColumn {
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Quarterly panel: a strictly increasing index plus one column per variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Panel {
    index: Vec<Quarter>,
    columns: Vec<PanelColumn>,
}

impl Panel {
    /// Build from raw parts, checking the index order, column lengths and
    /// column name uniqueness.
    pub fn from_columns(index: Vec<Quarter>, columns: Vec<PanelColumn>) -> Result<Self, PanelError> {
        if let Some(w) = index.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PanelError::UnorderedIndex(w[1]));
        }
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(PanelError::DuplicateColumn(col.name.clone()));
            }
            if col.values.len() != index.len() {
                return Err(PanelError::LengthMismatch {
                    column: col.name.clone(),
                    expected: index.len(),
                    got: col.values.len(),
                });
            }
        }
        Ok(Self { index, columns })
    }

    pub fn index(&self) -> &[Quarter] {
        &self.index
    }

    pub fn columns(&self) -> &[PanelColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&PanelColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// First and last period of the index.
    pub fn date_range(&self) -> Option<QuarterRange> {
        let (first, last) = (self.index.first()?, self.index.last()?);
        QuarterRange::new(*first, *last).ok()
    }

    /// Value of `column` at `period`, `None` if either is absent or the cell is null.
    pub fn value(&self, column: &str, period: Quarter) -> Option<f64> {
        let row = self.index.binary_search(&period).ok()?;
        self.column(column)?.values[row]
    }

    /// Extract one column back into a series over the panel index.
    pub fn to_series(&self, name: &str) -> Option<Series> {
        let col = self.column(name)?;
        Some(Series::from_points(
            name,
            self.index.iter().copied().zip(col.values.iter().copied()),
        ))
    }

    pub fn null_counts(&self) -> Vec<NullCount> {
        self.columns
            .iter()
            .map(|c| NullCount {
                column: c.name.clone(),
                nulls: c.null_count(),
            })
            .collect()
    }

    pub fn missing_report(&self) -> MissingReport {
        MissingReport {
            rows: self.row_count(),
            counts: self.null_counts(),
        }
    }

    /// BLAKE3 over the index labels, column names and cell bit patterns.
    pub fn data_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for q in &self.index {
            hasher.update(q.to_string().as_bytes());
            hasher.update(b"\n");
        }
        for col in &self.columns {
            hasher.update(col.name.as_bytes());
            hasher.update(b"\0");
            for v in &col.values {
                match v {
                    Some(x) => {
                        hasher.update(&[1]);
                        hasher.update(&x.to_bits().to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Null cells in one panel column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullCount {
    pub column: String,
    pub nulls: usize,
}

/// Per-column missing-value summary, printed after a build.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingReport {
    pub rows: usize,
    pub counts: Vec<NullCount>,
}

impl MissingReport {
    pub fn total_nulls(&self) -> usize {
        self.counts.iter().map(|c| c.nulls).sum()
    }
}

impl fmt::Display for MissingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .map(|c| c.column.len())
            .max()
            .unwrap_or(0)
            .max("column".len());
        writeln!(f, "{:<width$}  nulls (of {} rows)", "column", self.rows)?;
        for c in &self.counts {
            writeln!(f, "{:<width$}  {}", c.column, c.nulls)?;
        }
        Ok(())
    }
}

/// Align `series` onto one index: union of their periods within `window`.
///
/// Columns keep the input order. A name used twice is rejected.
pub fn assemble(series: &[Series], window: QuarterRange) -> Result<Panel, PanelError> {
    let mut seen = HashSet::new();
    for s in series {
        if !seen.insert(s.name()) {
            return Err(PanelError::DuplicateColumn(s.name().to_string()));
        }
    }

    let index: Vec<Quarter> = series
        .iter()
        .flat_map(|s| s.periods())
        .filter(|q| window.contains(*q))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = series
        .iter()
        .map(|s| PanelColumn {
            name: s.name().to_string(),
            values: index.iter().map(|q| s.get(*q)).collect(),
        })
        .collect();

    Ok(Panel { index, columns })
}
