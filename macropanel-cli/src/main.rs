//! macropanel CLI: build the quarterly panel, render the regime chart.
//!
//! Commands:
//! - `build`: fetch, derive and assemble the panel described by a TOML config
//! - `chart`: render the profit-rate regime chart
//! - `check`: validate a config and print the lead each series needs
//! - `fetch`: print one provider series as quarterly CSV on stdout
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use macropanel_core::data::{fetch_series, FetchMode, FredConfig, FredProvider};
use macropanel_runner::{Pipeline, PipelineConfig, RegimeChart};

#[derive(Parser)]
#[command(
    name = "macropanel",
    about = "Quarterly macro panel builder backed by FRED"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every source, compute derived series, write the panel.
    Build {
        /// Pipeline config (TOML).
        #[arg(long, default_value = "config/panel.toml")]
        config: PathBuf,

        /// FRED API key. Overrides [provider].api_key.
        #[arg(long, env = "FRED_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Panel output path (.csv or .parquet). Overrides [output].panel_path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Render the profit-rate regime chart as SVG.
    Chart {
        /// Pipeline config (TOML). Its [chart] table is used; defaults apply when absent.
        #[arg(long, default_value = "config/panel.toml")]
        config: PathBuf,

        /// FRED API key. Overrides [provider].api_key.
        #[arg(long, env = "FRED_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// SVG output path. Overrides [chart].output_path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a config without touching the network.
    Check {
        /// Pipeline config (TOML).
        #[arg(long, default_value = "config/panel.toml")]
        config: PathBuf,
    },
    /// Fetch one series and print it as quarterly CSV.
    Fetch {
        /// Provider series id (e.g., GDPC1).
        series_id: String,

        /// Observation start (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Observation end (YYYY-MM-DD). Defaults to the latest available.
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = ModeArg::Quarterly)]
        mode: ModeArg,

        /// FRED API key.
        #[arg(long, env = "FRED_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Literal the provider uses for a missing value.
        #[arg(long, default_value = ".")]
        sentinel: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Provider-side quarterly aggregation.
    Quarterly,
    /// Native frequency, one observation per quarter.
    Native,
    /// Native frequency, averaged within each quarter.
    NativeMean,
}

impl From<ModeArg> for FetchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Quarterly => FetchMode::Quarterly,
            ModeArg::Native => FetchMode::Native,
            ModeArg::NativeMean => FetchMode::NativeMean,
        }
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            config,
            api_key,
            output,
        } => run_build(&config, api_key, output),
        Commands::Chart {
            config,
            api_key,
            output,
        } => run_chart(&config, api_key, output),
        Commands::Check { config } => run_check(&config),
        Commands::Fetch {
            series_id,
            start,
            end,
            mode,
            api_key,
            sentinel,
        } => run_fetch(&series_id, start, end, mode.into(), api_key, sentinel),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path, api_key: Option<String>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if let Some(key) = api_key {
        config.provider.api_key = key;
    }
    Ok(config)
}

fn run_build(config_path: &Path, api_key: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path, api_key)?;
    if let Some(path) = output {
        config.output.panel_path = path;
    }
    if config.has_provider_sources() {
        config.require_api_key()?;
    }

    let provider =
        FredProvider::new(config.provider.clone()).context("creating the FRED client")?;
    let pipeline = Pipeline::new(config, &provider).context("invalid pipeline config")?;
    info!(run_id = %pipeline.config().run_id()?, config = %config_path.display(), "starting build");
    let output = pipeline.run().context("pipeline run failed")?;
    let paths = pipeline
        .persist(&output)
        .context("writing pipeline outputs")?;

    println!(
        "Panel: {} rows x {} columns",
        output.panel.row_count(),
        output.panel.columns().len()
    );
    if let Some(range) = output.panel.date_range() {
        println!("Range: {range}");
    }
    println!();
    print!("{}", output.report);
    println!();
    println!("Panel written to: {}", paths.panel.display());
    if let Some(manifest) = &paths.manifest {
        println!("Manifest: {}", manifest.display());
    }
    if !paths.series.is_empty() {
        println!("Series files: {}", paths.series.len());
    }
    Ok(())
}

fn run_chart(config_path: &Path, api_key: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, api_key)?;
    config.require_api_key()?;

    let mut chart_config = config.chart.clone().unwrap_or_default();
    if let Some(path) = output {
        chart_config.output_path = path;
    }

    let chart = RegimeChart::new(chart_config).context("invalid chart config")?;
    let provider =
        FredProvider::new(config.provider.clone()).context("creating the FRED client")?;
    let output = chart
        .fetch_and_render(&provider)
        .context("rendering the regime chart")?;

    if let (Some(first), Some(last)) = (output.points.first(), output.points.last()) {
        println!(
            "Profit rate {}-{}: {:.1}% -> {:.1}%",
            first.year, last.year, first.rate_pct, last.rate_pct
        );
    }
    println!("Chart written to: {}", output.path.display());
    Ok(())
}

fn run_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path, None)?;
    config.validate().context("invalid pipeline config")?;

    println!("Config OK: {}", config_path.display());
    println!("Run id:    {}", config.run_id()?);
    println!(
        "Window:    {}..={} (fetch from {})",
        config.window.analysis_start, config.window.analysis_end, config.window.fetch_start
    );
    println!();
    println!("Required lead (quarters before {}):", config.window.analysis_start);
    let leads = config.required_leads();
    let width = leads.keys().map(String::len).max().unwrap_or(0);
    for name in config.series_names() {
        if let Some(lead) = leads.get(name) {
            println!("  {name:<width$}  {lead}");
        }
    }
    if config.has_provider_sources() && config.require_api_key().is_err() {
        println!();
        println!("Note: no API key in the config; pass --api-key or set FRED_API_KEY to build.");
    }
    Ok(())
}

fn run_fetch(
    series_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    mode: FetchMode,
    api_key: String,
    sentinel: String,
) -> Result<()> {
    let provider = FredProvider::new(FredConfig {
        api_key,
        missing_sentinel: sentinel,
        ..FredConfig::default()
    })
    .context("creating the FRED client")?;

    let series = fetch_series(&provider, series_id, start, end, mode, series_id)
        .with_context(|| format!("fetching {series_id}"))?;

    println!("period,{series_id}");
    for obs in series.observations() {
        match obs.value {
            Some(v) => println!("{},{v}", obs.period),
            None => println!("{},", obs.period),
        }
    }
    Ok(())
}
