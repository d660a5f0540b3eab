//! Macropanel Runner: pipeline configuration, orchestration, manifests, regime chart.
//!
//! This crate builds on `macropanel-core` to provide:
//! - TOML pipeline configuration with up-front validation
//! - Sequential pipeline runs: fetch, derive, assemble, persist
//! - Run manifests with a content hash of the panel
//! - The profit-rate regime chart (SVG)

pub mod chart;
pub mod config;
pub mod manifest;
pub mod pipeline;

pub use chart::{
    build_profit_rate, default_regimes, render_chart, render_svg, resolve_regimes, ChartConfig,
    ChartError, ChartOutput, ProfitRatePoint, Regime, RegimeChart,
};
pub use config::{
    ConfigError, DerivedConfig, OutputConfig, PanelConfig, PipelineConfig, RunId, SourceConfig,
    SourceKind, WindowConfig,
};
pub use manifest::{read_manifest, write_manifest, ManifestError, RunManifest};
pub use pipeline::{PersistedPaths, Pipeline, PipelineError, PipelineOutput};
