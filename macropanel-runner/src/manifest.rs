//! Run manifest sidecar (JSON) written next to the panel file.

use chrono::{DateTime, Utc};
use macropanel_core::panel::{NullCount, Panel};
use macropanel_core::period::Quarter;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version for persisted manifests.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub panel_path: String,
    pub rows: usize,
    pub first_period: Option<Quarter>,
    pub last_period: Option<Quarter>,
    pub columns: Vec<String>,
    pub nulls: Vec<NullCount>,
    pub data_hash: String,
}

impl RunManifest {
    pub fn for_panel(run_id: &str, panel_path: &Path, panel: &Panel) -> Self {
        let range = panel.date_range();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            panel_path: panel_path.display().to_string(),
            rows: panel.row_count(),
            first_period: range.map(|r| r.start()),
            last_period: range.map(|r| r.end()),
            columns: panel.column_names().into_iter().map(str::to_string).collect(),
            nulls: panel.null_counts(),
            data_hash: panel.data_hash(),
        }
    }
}

/// `<panel_path>.manifest.json`
pub fn manifest_path(panel_path: &Path) -> PathBuf {
    let mut name = OsString::from(panel_path.as_os_str());
    name.push(".manifest.json");
    PathBuf::from(name)
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), ManifestError> {
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(path, json).map_err(|e| ManifestError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

/// Read a manifest, rejecting versions newer than this build understands.
pub fn read_manifest(path: &Path) -> Result<RunManifest, ManifestError> {
    let text = fs::read_to_string(path).map_err(|e| ManifestError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let probe: VersionProbe = serde_json::from_str(&text)?;
    if probe.schema_version > MANIFEST_SCHEMA_VERSION {
        return Err(ManifestError::UnsupportedVersion {
            found: probe.schema_version,
            supported: MANIFEST_SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use macropanel_core::panel::assemble;
    use macropanel_core::period::QuarterRange;
    use macropanel_core::series::Series;

    fn q(s: &str) -> Quarter {
        s.parse().unwrap()
    }

    fn panel() -> Panel {
        let a = Series::from_points("R", vec![(q("1963Q1"), Some(0.0)), (q("1963Q2"), None)]);
        assemble(&[a], QuarterRange::new(q("1963Q1"), q("1963Q4")).unwrap()).unwrap()
    }

    #[test]
    fn manifest_path_appends_suffix() {
        assert_eq!(
            manifest_path(Path::new("data/master_quarterly.csv")),
            PathBuf::from("data/master_quarterly.csv.manifest.json")
        );
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let manifest = RunManifest::for_panel("abc", Path::new("p.csv"), &panel());
        assert_eq!(manifest.rows, 2);
        assert_eq!(manifest.first_period, Some(q("1963Q1")));
        assert_eq!(manifest.nulls[0].nulls, 1);

        write_manifest(&path, &manifest).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), manifest);
    }

    #[test]
    fn future_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, r#"{"schema_version": 99, "something_new": true}"#).unwrap();
        assert!(matches!(
            read_manifest(&path),
            Err(ManifestError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
