//! Serializable pipeline configuration.
//!
//! One TOML file names every series, how it is obtained, how derived series
//! are computed, and which columns make up the panel. The file is validated
//! in full before any request is made.

use chrono::NaiveDate;
use macropanel_core::data::{FetchMode, FredConfig};
use macropanel_core::panel::io::PERIOD_COLUMN;
use macropanel_core::panel::is_panel_format;
use macropanel_core::period::{Quarter, QuarterRange};
use macropanel_core::transform::{create_transform, TransformError, TransformSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chart::{validate_regimes, ChartConfig, ChartError};

/// Content hash identifying a pipeline configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("analysis window ends ({end}) before it starts ({start})")]
    AnalysisWindow { start: Quarter, end: Quarter },

    #[error("fetch window ends ({end}) before it starts ({start})")]
    FetchWindow { start: NaiveDate, end: NaiveDate },

    #[error("series name '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("derived series '{series}' reads '{input}', which is not defined")]
    UnknownInput { series: String, input: String },

    #[error("derived series '{series}' reads '{input}', which is only defined after it")]
    ForwardReference { series: String, input: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("panel column '{0}' is not a defined series")]
    UnknownColumn(String),

    #[error("panel column '{0}' is listed more than once")]
    DuplicateColumn(String),

    #[error("panel has no columns")]
    EmptyPanel,

    #[error("series name '{0}' is reserved for the period column")]
    ReservedName(String),

    #[error("panel path {0} must end in .csv, .parquet or .pq")]
    PanelFormat(String),

    #[error(
        "source '{source_name}' ({series_id}) starts at {start} but needs data from {required} \
         ({lead} quarter(s) before the analysis window)"
    )]
    InsufficientLead {
        source_name: String,
        series_id: String,
        start: NaiveDate,
        required: Quarter,
        lead: usize,
    },

    #[error("source '{source_name}' ({series_id}) ends at {end}, before the analysis window ends ({analysis_end})")]
    FetchEndTooEarly {
        source_name: String,
        series_id: String,
        end: NaiveDate,
        analysis_end: Quarter,
    },

    #[error("an API key is required (set [provider].api_key or pass --api-key)")]
    MissingApiKey,

    #[error("chart: {0}")]
    Chart(#[from] ChartError),

    #[error("chart: capital_divisor must be a positive number, got {0}")]
    CapitalDivisor(f64),

    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// `[window]`: what to fetch and what to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Default observation start for provider sources. Fetch early enough
    /// to cover the lookback of lagged transforms.
    pub fetch_start: NaiveDate,
    #[serde(default)]
    pub fetch_end: Option<NaiveDate>,
    pub analysis_start: Quarter,
    pub analysis_end: Quarter,
}

impl WindowConfig {
    pub fn analysis_range(&self) -> Result<QuarterRange, ConfigError> {
        QuarterRange::new(self.analysis_start, self.analysis_end).map_err(|_| {
            ConfigError::AnalysisWindow {
                start: self.analysis_start,
                end: self.analysis_end,
            }
        })
    }
}

/// `[output]`: where artifacts land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// `.csv` or `.parquet`.
    pub panel_path: PathBuf,
    /// When set, every fetched and derived series is also written here as
    /// `<NAME>_quarterly.csv`.
    #[serde(default)]
    pub series_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub manifest: bool,
}

fn default_true() -> bool {
    true
}

/// Where a source series comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Provider series, fetched over the network.
    Provider {
        series_id: String,
        #[serde(default)]
        mode: FetchMode,
        /// Overrides `[window].fetch_start`.
        #[serde(default)]
        start: Option<NaiveDate>,
        /// Overrides `[window].fetch_end`.
        #[serde(default)]
        end: Option<NaiveDate>,
    },

    /// Manually curated CSV or Parquet file.
    File {
        path: PathBuf,
        period_column: String,
        /// Defaults to the source name.
        #[serde(default)]
        value_column: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub source: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedConfig {
    pub name: String,
    pub transform: TransformSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub columns: Vec<String>,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    #[serde(default)]
    pub provider: FredConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub derived: Vec<DerivedConfig>,
    pub panel: PanelConfig,
    #[serde(default)]
    pub chart: Option<ChartConfig>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Deterministic hash of this configuration, API key excluded.
    ///
    /// Two builds with the same run id asked for the same data.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let mut redacted = self.clone();
        redacted.provider.api_key.clear();
        let json =
            serde_json::to_string(&redacted).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn has_provider_sources(&self) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(s.source, SourceKind::Provider { .. }))
    }

    /// Fail unless an API key is set. Call after command-line overrides.
    pub fn require_api_key(&self) -> Result<(), ConfigError> {
        if self.provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// Names of all sources and derived series, in definition order.
    pub fn series_names(&self) -> Vec<&str> {
        self.sources
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.derived.iter().map(|d| d.name.as_str()))
            .collect()
    }

    /// Leading quarters each series needs before `analysis_start`.
    ///
    /// Panel columns need none. A transform with lookback `k` feeding a
    /// series that needs `n` makes each of its inputs need `n + k`. Only
    /// series that reach the panel appear in the result.
    pub fn required_leads(&self) -> BTreeMap<String, usize> {
        let mut leads: BTreeMap<String, usize> = self
            .panel
            .columns
            .iter()
            .map(|c| (c.clone(), 0))
            .collect();

        for derived in self.derived.iter().rev() {
            let Some(&lead) = leads.get(&derived.name) else {
                continue;
            };
            let needed = lead + derived.transform.lookback();
            for input in derived.transform.inputs() {
                let entry = leads.entry(input).or_insert(0);
                *entry = (*entry).max(needed);
            }
        }
        leads
    }

    /// Validate everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = &self.window;
        window.analysis_range()?;
        if let Some(end) = window.fetch_end {
            if end < window.fetch_start {
                return Err(ConfigError::FetchWindow {
                    start: window.fetch_start,
                    end,
                });
            }
        }

        let mut defined = HashSet::new();
        for name in self.series_names() {
            if name.eq_ignore_ascii_case(PERIOD_COLUMN) {
                return Err(ConfigError::ReservedName(name.to_string()));
            }
            if !defined.insert(name) {
                return Err(ConfigError::DuplicateName(name.to_string()));
            }
        }

        let mut available: HashSet<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        for derived in &self.derived {
            create_transform(&derived.name, &derived.transform)?;
            for input in derived.transform.inputs() {
                if available.contains(input.as_str()) {
                    continue;
                }
                return Err(if defined.contains(input.as_str()) {
                    ConfigError::ForwardReference {
                        series: derived.name.clone(),
                        input,
                    }
                } else {
                    ConfigError::UnknownInput {
                        series: derived.name.clone(),
                        input,
                    }
                });
            }
            available.insert(derived.name.as_str());
        }

        if self.panel.columns.is_empty() {
            return Err(ConfigError::EmptyPanel);
        }
        let mut seen = HashSet::new();
        for column in &self.panel.columns {
            if !defined.contains(column.as_str()) {
                return Err(ConfigError::UnknownColumn(column.clone()));
            }
            if !seen.insert(column.as_str()) {
                return Err(ConfigError::DuplicateColumn(column.clone()));
            }
        }

        if !is_panel_format(&self.output.panel_path) {
            return Err(ConfigError::PanelFormat(
                self.output.panel_path.display().to_string(),
            ));
        }

        self.validate_source_windows()?;

        if let Some(chart) = &self.chart {
            validate_regimes(&chart.regimes)?;
            if !(chart.capital_divisor.is_finite() && chart.capital_divisor > 0.0) {
                return Err(ConfigError::CapitalDivisor(chart.capital_divisor));
            }
        }
        Ok(())
    }

    /// Provider sources must cover the lead their consumers need and reach
    /// the end of the analysis window.
    fn validate_source_windows(&self) -> Result<(), ConfigError> {
        let leads = self.required_leads();
        let window = &self.window;

        for source in &self.sources {
            let SourceKind::Provider {
                series_id,
                start,
                end,
                ..
            } = &source.source
            else {
                continue;
            };
            let Some(&lead) = leads.get(&source.name) else {
                continue;
            };

            let start = start.unwrap_or(window.fetch_start);
            let required = window.analysis_start.offset(-(lead as i64));
            if start > required.first_day() {
                return Err(ConfigError::InsufficientLead {
                    source_name: source.name.clone(),
                    series_id: series_id.clone(),
                    start,
                    required,
                    lead,
                });
            }

            if let Some(end) = end.or(window.fetch_end) {
                if Quarter::from_date(end) < window.analysis_end {
                    return Err(ConfigError::FetchEndTooEarly {
                        source_name: source.name.clone(),
                        series_id: series_id.clone(),
                        end,
                        analysis_end: window.analysis_end,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [window]
        fetch_start = "1962-01-01"
        fetch_end = "2019-01-01"
        analysis_start = "1963Q1"
        analysis_end = "2018Q2"

        [output]
        panel_path = "out/master_quarterly.csv"

        [[sources]]
        name = "GFCF"
        source = { type = "PROVIDER", series_id = "NCBGCFQ027S" }

        [[derived]]
        name = "INVR"
        transform = { type = "PERCENT_GROWTH", input = "GFCF" }

        [panel]
        columns = ["INVR"]
    "#;

    fn minimal() -> PipelineConfig {
        PipelineConfig::from_toml_str(MINIMAL).unwrap()
    }

    #[test]
    fn parses_with_defaults() {
        let cfg = minimal();
        assert_eq!(cfg.window.analysis_start, Quarter::new(1963, 1).unwrap());
        assert_eq!(cfg.provider.missing_sentinel, ".");
        assert!(cfg.output.manifest);
        assert!(cfg.chart.is_none());
        assert_eq!(
            cfg.sources[0].source,
            SourceKind::Provider {
                series_id: "NCBGCFQ027S".into(),
                mode: FetchMode::Quarterly,
                start: None,
                end: None,
            }
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn run_id_ignores_api_key() {
        let a = minimal();
        let mut b = minimal();
        b.provider.api_key = "secret".into();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());

        let mut c = minimal();
        c.window.analysis_end = Quarter::new(2018, 1).unwrap();
        assert_ne!(a.run_id().unwrap(), c.run_id().unwrap());
    }

    #[test]
    fn missing_api_key_detected() {
        let mut cfg = minimal();
        assert!(matches!(cfg.require_api_key(), Err(ConfigError::MissingApiKey)));
        cfg.provider.api_key = "k".into();
        cfg.require_api_key().unwrap();
    }

    #[test]
    fn leads_propagate_through_chains() {
        let mut cfg = minimal();
        // INVR2 = growth of INVR: GFCF now needs two quarters of lead
        cfg.derived.push(DerivedConfig {
            name: "INVR2".into(),
            transform: TransformSpec::PercentGrowth {
                input: "INVR".into(),
            },
        });
        cfg.panel.columns = vec!["INVR".into(), "INVR2".into()];
        let leads = cfg.required_leads();
        assert_eq!(leads["INVR2"], 0);
        assert_eq!(leads["INVR"], 1);
        assert_eq!(leads["GFCF"], 2);

        // 1962-01-01 is 1962Q1, four quarters ahead of 1963Q1
        cfg.validate().unwrap();
    }

    #[test]
    fn insufficient_lead_is_fatal() {
        let mut cfg = minimal();
        cfg.window.fetch_start = NaiveDate::from_ymd_opt(1963, 1, 1).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(
            matches!(&err, ConfigError::InsufficientLead { source_name, lead: 1, .. } if source_name == "GFCF"),
            "{err}"
        );
    }

    #[test]
    fn source_start_overrides_window() {
        let mut cfg = minimal();
        cfg.window.fetch_start = NaiveDate::from_ymd_opt(1963, 1, 1).unwrap();
        cfg.sources[0].source = SourceKind::Provider {
            series_id: "NCBGCFQ027S".into(),
            mode: FetchMode::Quarterly,
            start: NaiveDate::from_ymd_opt(1962, 10, 1),
            end: None,
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn fetch_end_must_cover_analysis_end() {
        let mut cfg = minimal();
        cfg.window.fetch_end = NaiveDate::from_ymd_opt(2018, 1, 1);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::FetchEndTooEarly { .. })
        ));
    }

    #[test]
    fn forward_and_unknown_references() {
        let mut cfg = minimal();
        cfg.derived.insert(
            0,
            DerivedConfig {
                name: "EARLY".into(),
                transform: TransformSpec::Identity {
                    input: "INVR".into(),
                },
            },
        );
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ForwardReference { series, .. }) if series == "EARLY"
        ));

        cfg.derived[0].transform = TransformSpec::Identity {
            input: "NOPE".into(),
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownInput { input, .. }) if input == "NOPE"
        ));
    }

    #[test]
    fn panel_columns_checked() {
        let mut cfg = minimal();
        cfg.panel.columns = vec!["INVR".into(), "TOBQ".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownColumn(c)) if c == "TOBQ"));

        cfg.panel.columns = vec!["INVR".into(), "INVR".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateColumn(_))));

        cfg.panel.columns.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyPanel)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut cfg = minimal();
        cfg.derived[0].name = "GFCF".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateName(n)) if n == "GFCF"));
    }

    #[test]
    fn period_is_a_reserved_name() {
        let mut cfg = minimal();
        cfg.derived[0].name = "period".into();
        cfg.panel.columns = vec!["period".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::ReservedName(n)) if n == "period"));

        let mut cfg = minimal();
        cfg.sources[0].name = "Period".into();
        cfg.derived[0].transform = TransformSpec::PercentGrowth {
            input: "Period".into(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ReservedName(n)) if n == "Period"));
    }

    #[test]
    fn panel_path_must_be_writable_format() {
        let mut cfg = minimal();
        cfg.output.panel_path = PathBuf::from("out/master_quarterly.xlsx");
        assert!(matches!(cfg.validate(), Err(ConfigError::PanelFormat(p)) if p.ends_with(".xlsx")));

        cfg.output.panel_path = PathBuf::from("out/master_quarterly");
        assert!(matches!(cfg.validate(), Err(ConfigError::PanelFormat(_))));

        cfg.output.panel_path = PathBuf::from("out/master_quarterly.parquet");
        cfg.validate().unwrap();
    }

    #[test]
    fn inverted_windows_rejected() {
        let mut cfg = minimal();
        cfg.window.analysis_end = Quarter::new(1962, 4).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::AnalysisWindow { .. })));

        let mut cfg = minimal();
        cfg.window.fetch_end = NaiveDate::from_ymd_opt(1961, 1, 1);
        assert!(matches!(cfg.validate(), Err(ConfigError::FetchWindow { .. })));
    }

    #[test]
    fn chart_table_uses_defaults() {
        let text = format!("{MINIMAL}\n[chart]\nstart_year = 1960\n");
        let cfg = PipelineConfig::from_toml_str(&text).unwrap();
        let chart = cfg.chart.as_ref().unwrap();
        assert_eq!(chart.start_year, 1960);
        assert_eq!(chart.profits_series, "CP");
        assert_eq!(chart.regimes.len(), 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_regime_color_rejected() {
        let text = format!(
            "{MINIMAL}\n[chart]\n[[chart.regimes]]\nlabel = \"x\"\nstart = \"1950-01-01\"\ncolor = \"blue\"\n"
        );
        let cfg = PipelineConfig::from_toml_str(&text).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Chart(ChartError::InvalidColor(_)))
        ));
    }
}
