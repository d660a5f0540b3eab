//! Pipeline runner: wires the fetcher, transforms, and panel assembler.
//!
//! Everything runs strictly in sequence: sources in declaration order, then
//! derived series in declaration order, then assembly. The first error
//! aborts the run, and nothing is written until the panel is complete.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use macropanel_core::data::{fetch_series, ingest_file, DataError, SeriesProvider};
use macropanel_core::panel::{
    assemble, write_panel, write_series_csv, MissingReport, Panel, PanelError,
};
use macropanel_core::series::Series;
use macropanel_core::transform::{run_transforms, TransformError};

use crate::config::{ConfigError, PipelineConfig, SourceKind};
use crate::manifest::{manifest_path, write_manifest, ManifestError, RunManifest};

/// Errors from a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("panel error: {0}")]
    Panel(#[from] PanelError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("series '{0}' was not produced by any source or transform")]
    UnknownSeries(String),
}

/// Everything a run produced, before anything is written.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub panel: Panel,
    /// Every fetched, ingested and derived series, by name.
    pub series: BTreeMap<String, Series>,
    pub report: MissingReport,
}

/// Paths written by [`Pipeline::persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPaths {
    pub panel: PathBuf,
    pub manifest: Option<PathBuf>,
    pub series: Vec<PathBuf>,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    provider: &'a dyn SeriesProvider,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and bind it to a provider.
    pub fn new(
        config: PipelineConfig,
        provider: &'a dyn SeriesProvider,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch or ingest every source, in declaration order.
    pub fn resolve_sources(&self) -> Result<BTreeMap<String, Series>, PipelineError> {
        let window = &self.config.window;
        let mut resolved = BTreeMap::new();

        for source in &self.config.sources {
            let series = match &source.source {
                SourceKind::Provider {
                    series_id,
                    mode,
                    start,
                    end,
                } => fetch_series(
                    self.provider,
                    series_id,
                    start.unwrap_or(window.fetch_start),
                    end.or(window.fetch_end),
                    *mode,
                    &source.name,
                )?,
                SourceKind::File {
                    path,
                    period_column,
                    value_column,
                } => ingest_file(
                    path,
                    period_column,
                    value_column.as_deref().unwrap_or(&source.name),
                    &source.name,
                )?,
            };
            resolved.insert(source.name.clone(), series);
        }
        Ok(resolved)
    }

    /// Apply every derived spec in order, adding outputs to `series`.
    pub fn derive(&self, series: &mut BTreeMap<String, Series>) -> Result<(), PipelineError> {
        let steps: Vec<_> = self
            .config
            .derived
            .iter()
            .map(|d| (d.name.clone(), d.transform.clone()))
            .collect();
        run_transforms(&steps, series)?;
        Ok(())
    }

    /// Resolve, derive and assemble. Nothing is written.
    pub fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let mut series = self.resolve_sources()?;
        self.derive(&mut series)?;

        let columns = self
            .config
            .panel
            .columns
            .iter()
            .map(|name| {
                series
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownSeries(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let window = self.config.window.analysis_range()?;
        let panel = assemble(&columns, window)?;
        let report = panel.missing_report();

        info!(
            rows = panel.row_count(),
            columns = panel.columns().len(),
            window = %window,
            "assembled panel"
        );
        for count in &report.counts {
            if count.nulls == panel.row_count() && count.nulls > 0 {
                warn!(column = %count.column, "column is entirely null in the analysis window");
            } else {
                info!(column = %count.column, nulls = count.nulls, "missing values");
            }
        }

        Ok(PipelineOutput {
            panel,
            series,
            report,
        })
    }

    /// Write the panel, then per-series CSVs and the manifest when enabled.
    pub fn persist(&self, output: &PipelineOutput) -> Result<PersistedPaths, PipelineError> {
        let out = &self.config.output;

        // panel first: a failure here leaves no per-series files behind
        write_panel(&output.panel, &out.panel_path)?;
        info!(path = %out.panel_path.display(), "wrote panel");

        let mut series_paths = Vec::new();
        if let Some(dir) = &out.series_dir {
            fs::create_dir_all(dir).map_err(|e| PipelineError::Io {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            for (name, series) in &output.series {
                let path = dir.join(format!("{name}_quarterly.csv"));
                write_series_csv(series, &path)?;
                series_paths.push(path);
            }
        }

        let manifest = if out.manifest {
            let path = manifest_path(&out.panel_path);
            let run_id = self.config.run_id()?;
            write_manifest(
                &path,
                &RunManifest::for_panel(&run_id, &out.panel_path, &output.panel),
            )?;
            info!(path = %path.display(), %run_id, "wrote manifest");
            Some(path)
        } else {
            None
        };

        Ok(PersistedPaths {
            panel: out.panel_path.clone(),
            manifest,
            series: series_paths,
        })
    }
}
