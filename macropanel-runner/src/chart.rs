//! Regime chart: annual corporate rate of profit with shaded historical eras.
//!
//! Two provider series are fetched at native frequency and averaged per
//! calendar year: corporate profits (quarterly, billions) and the net stock of
//! private nonresidential fixed assets (annual, millions). The rate is
//! `profits / (capital / divisor) * 100`. Regime bands are drawn first and the
//! profit-rate line on top, so the line is never hidden by a band.

use chrono::{Datelike, NaiveDate};
use macropanel_core::data::{
    annual_mean, DataError, FetchRequest, Frequency, RawObservation, SeriesProvider,
};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("no overlapping years with valid data from {start_year} on")]
    NoData { start_year: i32 },

    #[error("render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid color '{0}' (expected #rrggbb)")]
    InvalidColor(String),

    #[error("regime '{label}': {reason}")]
    InvalidRegime { label: String, reason: String },
}

/// A named historical era shaded on the chart.
///
/// `end = None` runs through the last plotted year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub label: String,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    pub color: String,
}

impl Regime {
    pub fn new(label: &str, start: NaiveDate, end: Option<NaiveDate>, color: &str) -> Self {
        Self {
            label: label.to_string(),
            start,
            end,
            color: color.to_string(),
        }
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// The four postwar eras of U.S. accumulation.
pub fn default_regimes() -> Vec<Regime> {
    vec![
        Regime::new(
            "Golden age of accumulation",
            ymd(1950, 1, 1),
            Some(ymd(1969, 12, 31)),
            "#c6dbef",
        ),
        Regime::new(
            "Stagflation (1970s)",
            ymd(1970, 1, 1),
            Some(ymd(1979, 12, 31)),
            "#fdd0a2",
        ),
        Regime::new(
            "Neoliberal era (1980\u{2013}2007)",
            ymd(1980, 1, 1),
            Some(ymd(2007, 12, 31)),
            "#c7e9c0",
        ),
        Regime::new("Post-2007 \"new normal\"", ymd(2008, 1, 1), None, "#e0e0e0"),
    ]
}

/// Chart settings, the `[chart]` table of the pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub profits_series: String,
    pub capital_series: String,
    pub observation_start: NaiveDate,
    pub start_year: i32,
    /// Capital is divided by this before the ratio (millions to billions).
    pub capital_divisor: f64,
    pub output_path: PathBuf,
    pub title: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub regimes: Vec<Regime>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            profits_series: "CP".to_string(),
            capital_series: "K1NTOTL1ES000".to_string(),
            observation_start: ymd(1947, 1, 1),
            start_year: 1950,
            capital_divisor: 1000.0,
            output_path: PathBuf::from("profit_rate_timeline.svg"),
            title: "U.S. Corporate Rate of Profit and Economic Regimes, 1950\u{2013}Present"
                .to_string(),
            y_label: "Rate of profit (% of net private nonresidential fixed assets)".to_string(),
            width: 1200,
            height: 600,
            regimes: default_regimes(),
        }
    }
}

/// One plotted year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitRatePoint {
    pub year: i32,
    pub profits: f64,
    pub capital: f64,
    pub rate_pct: f64,
}

/// Annual profit rate from raw provider observations.
///
/// Both inputs are averaged per calendar year and inner-joined on year.
/// Years before `start_year` and years whose rate is not finite are dropped.
pub fn build_profit_rate(
    profits_raw: &[RawObservation],
    capital_raw: &[RawObservation],
    start_year: i32,
    capital_divisor: f64,
) -> Vec<ProfitRatePoint> {
    let profits = annual_mean(profits_raw);
    let capital: BTreeMap<i32, f64> = annual_mean(capital_raw);

    profits
        .into_iter()
        .filter(|(year, _)| *year >= start_year)
        .filter_map(|(year, p)| {
            let k = *capital.get(&year)?;
            let rate_pct = p / (k / capital_divisor) * 100.0;
            rate_pct.is_finite().then_some(ProfitRatePoint {
                year,
                profits: p,
                capital: k,
                rate_pct,
            })
        })
        .collect()
}

/// Parse `#rrggbb`.
pub fn parse_hex_color(text: &str) -> Result<RGBColor, ChartError> {
    let invalid = || ChartError::InvalidColor(text.to_string());
    let hex = text.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

/// Check colors, ordering and overlap. Only the last regime may be open-ended.
pub fn validate_regimes(regimes: &[Regime]) -> Result<(), ChartError> {
    let invalid = |r: &Regime, reason: String| ChartError::InvalidRegime {
        label: r.label.clone(),
        reason,
    };

    for (i, r) in regimes.iter().enumerate() {
        parse_hex_color(&r.color)?;
        match r.end {
            Some(end) if end < r.start => {
                return Err(invalid(r, format!("ends ({end}) before it starts ({})", r.start)))
            }
            None if i + 1 < regimes.len() => {
                return Err(invalid(r, "only the last regime may be open-ended".into()))
            }
            _ => {}
        }
        if let Some(prev) = i.checked_sub(1).map(|j| &regimes[j]) {
            if r.start <= prev.start {
                return Err(invalid(r, format!("starts before or with '{}'", prev.label)));
            }
            if prev.end.is_some_and(|end| r.start <= end) {
                return Err(invalid(r, format!("overlaps '{}'", prev.label)));
            }
        }
    }
    Ok(())
}

/// A regime mapped onto the chart's fractional-year axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegime {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub color: RGBColor,
}

fn fractional_year(date: NaiveDate) -> f64 {
    let y = date.year();
    let days = if (y % 4 == 0 && y % 100 != 0) || y % 400 == 0 {
        366.0
    } else {
        365.0
    };
    y as f64 + date.ordinal0() as f64 / days
}

/// Close open-ended regimes at `last_year` and drop those starting after it.
pub fn resolve_regimes(
    regimes: &[Regime],
    last_year: i32,
) -> Result<Vec<ResolvedRegime>, ChartError> {
    let last = last_year as f64;
    let mut resolved = Vec::with_capacity(regimes.len());
    for r in regimes {
        let start = fractional_year(r.start);
        let end = r.end.map(fractional_year).unwrap_or(last);
        if start > last {
            debug!(regime = %r.label, "starts after the last plotted year; skipped");
            continue;
        }
        resolved.push(ResolvedRegime {
            label: r.label.clone(),
            start,
            end: end.min(last.max(start)),
            color: parse_hex_color(&r.color)?,
        });
    }
    Ok(resolved)
}

fn render_err(e: impl std::fmt::Display) -> ChartError {
    ChartError::Render(e.to_string())
}

/// Y range `[min * 0.9, max * 1.1]`, widened outward for negative values.
fn y_range(points: &[ProfitRatePoint]) -> (f64, f64) {
    let min = points.iter().map(|p| p.rate_pct).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.rate_pct).fold(f64::NEG_INFINITY, f64::max);
    let lo = if min >= 0.0 { min * 0.9 } else { min * 1.1 };
    let hi = if max >= 0.0 { max * 1.1 } else { max * 0.9 };
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// Render the chart as an SVG document.
pub fn render_svg(
    points: &[ProfitRatePoint],
    regimes: &[ResolvedRegime],
    cfg: &ChartConfig,
) -> Result<String, ChartError> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f.year as f64, l.year as f64),
        _ => {
            return Err(ChartError::NoData {
                start_year: cfg.start_year,
            })
        }
    };
    let (x_lo, x_hi) = if last > first {
        (first, last)
    } else {
        (first - 1.0, last + 1.0)
    };
    let (y_lo, y_hi) = y_range(points);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (cfg.width, cfg.height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&cfg.title, ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Year")
            .y_desc(cfg.y_label.as_str())
            .x_label_formatter(&|x: &f64| format!("{x:.0}"))
            .draw()
            .map_err(render_err)?;

        for regime in regimes {
            let color = regime.color;
            let band = Rectangle::new(
                [(regime.start.max(x_lo), y_lo), (regime.end.min(x_hi), y_hi)],
                color.mix(0.4).filled(),
            );
            chart
                .draw_series(std::iter::once(band))
                .map_err(render_err)?
                .label(regime.label.as_str())
                .legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.mix(0.4).filled())
                });
        }

        chart
            .draw_series(LineSeries::new(
                points.iter().map(|p| (p.year as f64, p.rate_pct)),
                BLACK.stroke_width(2),
            ))
            .map_err(render_err)?
            .label("Rate of profit")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], BLACK.stroke_width(2)));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

/// Render to `path`, writing through a temporary file.
pub fn render_chart(
    points: &[ProfitRatePoint],
    regimes: &[ResolvedRegime],
    cfg: &ChartConfig,
    path: &Path,
) -> Result<(), ChartError> {
    let svg = render_svg(points, regimes, cfg)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(render_err)?;
    }
    let tmp = path.with_extension("svg.tmp");
    fs::write(&tmp, svg).map_err(render_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        render_err(e)
    })
}

/// What a chart run produced.
#[derive(Debug, Clone)]
pub struct ChartOutput {
    pub points: Vec<ProfitRatePoint>,
    pub path: PathBuf,
}

/// Fetches the two inputs, builds the annual rate, and renders the chart.
pub struct RegimeChart {
    config: ChartConfig,
}

impl RegimeChart {
    pub fn new(config: ChartConfig) -> Result<Self, ChartError> {
        validate_regimes(&config.regimes)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    fn fetch_native(
        &self,
        provider: &dyn SeriesProvider,
        series_id: &str,
    ) -> Result<Vec<RawObservation>, ChartError> {
        let request = FetchRequest::new(series_id, self.config.observation_start)
            .with_frequency(Frequency::Native);
        info!(provider = provider.name(), %request, "fetching chart input");
        Ok(provider.fetch(&request)?)
    }

    /// Compute the plotted points without rendering.
    pub fn build(
        &self,
        provider: &dyn SeriesProvider,
    ) -> Result<Vec<ProfitRatePoint>, ChartError> {
        let profits = self.fetch_native(provider, &self.config.profits_series)?;
        let capital = self.fetch_native(provider, &self.config.capital_series)?;
        let points = build_profit_rate(
            &profits,
            &capital,
            self.config.start_year,
            self.config.capital_divisor,
        );
        if points.is_empty() {
            return Err(ChartError::NoData {
                start_year: self.config.start_year,
            });
        }
        Ok(points)
    }

    pub fn fetch_and_render(
        &self,
        provider: &dyn SeriesProvider,
    ) -> Result<ChartOutput, ChartError> {
        let points = self.build(provider)?;
        let last_year = points.last().map(|p| p.year).unwrap_or(self.config.start_year);
        let regimes = resolve_regimes(&self.config.regimes, last_year)?;
        render_chart(&points, &regimes, &self.config, &self.config.output_path)?;
        info!(
            years = points.len(),
            regimes = regimes.len(),
            path = %self.config.output_path.display(),
            "rendered profit-rate chart"
        );
        Ok(ChartOutput {
            points,
            path: self.config.output_path.clone(),
        })
    }
}
