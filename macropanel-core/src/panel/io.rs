//! Panel persistence: CSV and Parquet.
//!
//! Layout is one row per quarter: a leading `period` column with labels like
//! `1963Q1`, then one column per variable. CSV writes null as an empty field
//! and numbers in their shortest round-trip form. All writes go to
//! `<path>.tmp` first and are renamed into place.

use super::{Panel, PanelColumn, PanelError};
use crate::period::Quarter;
use crate::series::{finite, Series};
use polars::prelude::*;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const PERIOD_COLUMN: &str = "period";

fn io_err(path: &Path, e: impl std::fmt::Display) -> PanelError {
    PanelError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> PanelError {
    PanelError::Malformed {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Run `write` against `<path>.tmp`, then rename over `path`.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), PanelError>,
) -> Result<(), PanelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_path(path);
    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(path, format!("atomic rename failed: {e}"))
    })
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ── CSV ─────────────────────────────────────────────────────────────

pub fn write_csv(panel: &Panel, path: &Path) -> Result<(), PanelError> {
    write_atomic(path, |tmp| {
        let mut wtr = csv::Writer::from_path(tmp).map_err(|e| io_err(tmp, e))?;
        let mut header = vec![PERIOD_COLUMN];
        header.extend(panel.column_names());
        wtr.write_record(&header).map_err(|e| io_err(tmp, e))?;

        for (row, period) in panel.index().iter().enumerate() {
            let mut record = Vec::with_capacity(panel.columns().len() + 1);
            record.push(period.to_string());
            record.extend(panel.columns().iter().map(|c| format_cell(c.values[row])));
            wtr.write_record(&record).map_err(|e| io_err(tmp, e))?;
        }
        wtr.flush().map_err(|e| io_err(tmp, e))?;
        Ok(())
    })
}

pub fn read_csv(path: &Path) -> Result<Panel, PanelError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| io_err(path, e))?;
    let headers = rdr.headers().map_err(|e| io_err(path, e))?.clone();

    match headers.get(0) {
        Some(PERIOD_COLUMN) => {}
        other => {
            return Err(malformed(
                path,
                format!("first column must be '{PERIOD_COLUMN}', found {other:?}"),
            ))
        }
    }

    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut index = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];

    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| io_err(path, e))?;
        let row = i + 2;
        let period: Quarter = record
            .get(0)
            .unwrap_or("")
            .parse()
            .map_err(|e| malformed(path, format!("row {row}: {e}")))?;
        index.push(period);

        for (col, cells) in values.iter_mut().enumerate() {
            let cell = record.get(col + 1).unwrap_or("").trim();
            let value = if cell.is_empty() {
                None
            } else {
                let v: f64 = cell.parse().map_err(|_| {
                    malformed(path, format!("row {row}, column '{}': '{cell}' is not a number", names[col]))
                })?;
                finite(v)
            };
            cells.push(value);
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| PanelColumn { name, values })
        .collect();
    Panel::from_columns(index, columns)
}

// ── Parquet ─────────────────────────────────────────────────────────

fn panel_to_dataframe(panel: &Panel) -> Result<DataFrame, PanelError> {
    let labels: Vec<String> = panel.index().iter().map(|q| q.to_string()).collect();
    let mut columns = vec![Column::new(PERIOD_COLUMN.into(), labels)];
    for col in panel.columns() {
        columns.push(Column::new(col.name.as_str().into(), col.values.clone()));
    }
    DataFrame::new(columns).map_err(|e| PanelError::Parquet(format!("dataframe creation: {e}")))
}

pub fn write_parquet(panel: &Panel, path: &Path) -> Result<(), PanelError> {
    let mut df = panel_to_dataframe(panel)?;
    write_atomic(path, |tmp| {
        let file = fs::File::create(tmp).map_err(|e| io_err(tmp, e))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| PanelError::Parquet(format!("write parquet: {e}")))?;
        Ok(())
    })
}

pub fn read_parquet(path: &Path) -> Result<Panel, PanelError> {
    let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| PanelError::Parquet(format!("read: {e}")))?;

    let period_col = df
        .column(PERIOD_COLUMN)
        .map_err(|_| malformed(path, format!("missing '{PERIOD_COLUMN}' column")))?;
    let labels = period_col
        .str()
        .map_err(|e| malformed(path, format!("period column type: {e}")))?;

    let index = labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            label
                .ok_or_else(|| malformed(path, format!("null period at row {i}")))?
                .parse::<Quarter>()
                .map_err(|e| malformed(path, format!("row {i}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = Vec::new();
    for name in df.get_column_names() {
        if name.as_str() == PERIOD_COLUMN {
            continue;
        }
        let col = df
            .column(name.as_str())
            .and_then(|c| c.cast(&DataType::Float64))
            .map_err(|e| PanelError::Parquet(format!("column '{name}': {e}")))?;
        let ca = col
            .f64()
            .map_err(|e| PanelError::Parquet(format!("column '{name}' type: {e}")))?;
        columns.push(PanelColumn {
            name: name.to_string(),
            values: ca.into_iter().map(|v| v.and_then(finite)).collect(),
        });
    }

    Panel::from_columns(index, columns)
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Whether [`write_panel`] and [`read_panel`] handle this path's extension.
pub fn is_panel_format(path: &Path) -> bool {
    matches!(extension(path).as_str(), "csv" | "parquet" | "pq")
}

/// Write `panel` as CSV or Parquet depending on the extension of `path`.
pub fn write_panel(panel: &Panel, path: &Path) -> Result<(), PanelError> {
    match extension(path).as_str() {
        "csv" => write_csv(panel, path),
        "parquet" | "pq" => write_parquet(panel, path),
        other => Err(PanelError::UnsupportedFormat(other.to_string())),
    }
}

pub fn read_panel(path: &Path) -> Result<Panel, PanelError> {
    match extension(path).as_str() {
        "csv" => read_csv(path),
        "parquet" | "pq" => read_parquet(path),
        other => Err(PanelError::UnsupportedFormat(other.to_string())),
    }
}

/// Write one series as a two-column CSV: `period,<name>`.
pub fn write_series_csv(series: &Series, path: &Path) -> Result<(), PanelError> {
    write_atomic(path, |tmp| {
        let mut wtr = csv::Writer::from_path(tmp).map_err(|e| io_err(tmp, e))?;
        wtr.write_record([PERIOD_COLUMN, series.name()])
            .map_err(|e| io_err(tmp, e))?;
        for obs in series.observations() {
            wtr.write_record([obs.period.to_string(), format_cell(obs.value)])
                .map_err(|e| io_err(tmp, e))?;
        }
        wtr.flush().map_err(|e| io_err(tmp, e))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::assemble;
    use crate::period::QuarterRange;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("macropanel_io_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn q(s: &str) -> Quarter {
        s.parse().unwrap()
    }

    fn sample_panel() -> Panel {
        let a = Series::from_points("R", vec![(q("1963Q1"), Some(0.0)), (q("1963Q2"), Some(1.0))]);
        let b = Series::from_points("CPIR", vec![(q("1963Q2"), Some(0.1))]);
        assemble(&[a, b], QuarterRange::new(q("1963Q1"), q("1963Q2")).unwrap()).unwrap()
    }

    #[test]
    fn csv_layout() {
        let dir = temp_dir();
        let path = dir.join("master_quarterly.csv");
        write_csv(&sample_panel(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "period,R,CPIR\n1963Q1,0,\n1963Q2,1,0.1\n");
        assert!(!tmp_path(&path).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_round_trip() {
        let dir = temp_dir();
        let path = dir.join("panel.csv");
        let panel = sample_panel();
        write_panel(&panel, &path).unwrap();
        assert_eq!(read_panel(&path).unwrap(), panel);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn parquet_round_trip() {
        let dir = temp_dir();
        let path = dir.join("panel.parquet");
        let panel = sample_panel();
        write_panel(&panel, &path).unwrap();
        let loaded = read_panel(&path).unwrap();
        assert_eq!(loaded, panel);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_csv_rejects_missing_period_column() {
        let dir = temp_dir();
        let path = dir.join("bad.csv");
        fs::write(&path, "date,R\n1963Q1,1\n").unwrap();
        assert!(matches!(read_csv(&path), Err(PanelError::Malformed { .. })));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_csv_rejects_non_numeric_cell() {
        let dir = temp_dir();
        let path = dir.join("bad.csv");
        fs::write(&path, "period,R\n1963Q1,abc\n").unwrap();
        let err = read_csv(&path).unwrap_err();
        assert!(err.to_string().contains("'abc' is not a number"), "{err}");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = temp_dir();
        let err = write_panel(&sample_panel(), &dir.join("panel.xlsx")).unwrap_err();
        assert!(matches!(err, PanelError::UnsupportedFormat(ext) if ext == "xlsx"));
        assert!(!is_panel_format(&dir.join("panel.xlsx")));
        assert!(is_panel_format(Path::new("out/panel.CSV")));
        assert!(is_panel_format(Path::new("out/panel.pq")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn series_csv_creates_parent_dirs() {
        let dir = temp_dir();
        let path = dir.join("series").join("CPIR_quarterly.csv");
        let s = Series::from_points("CPIR", vec![(q("1963Q1"), None), (q("1963Q2"), Some(-0.25))]);
        write_series_csv(&s, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "period,CPIR\n1963Q1,\n1963Q2,-0.25\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
