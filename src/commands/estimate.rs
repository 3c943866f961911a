//! Estimate command: funnel CSV in, conversion confidence report out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::analytics::funnel::FunnelDataset;
use crate::analytics::posterior::{update, Observation};
use crate::analytics::report::{write_series_csv, FunnelReport, ReportFormat};
use crate::config::Config;
use crate::metrics;
use crate::{Error, Result};

/// CLI arguments for `estimate`. Unset values fall back to [`Config`].
#[derive(Debug, Clone, Default)]
pub struct EstimateArgs {
    pub input: PathBuf,
    pub confidence: Option<f64>,
    pub target: Option<f64>,
    pub prior_alpha: Option<f64>,
    pub prior_beta: Option<f64>,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub series_csv: Option<PathBuf>,
    pub keep_order: bool,
    pub preview: Option<usize>,
}

/// Resolved model settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateSettings {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub confidence_level: f64,
    pub target_rate: f64,
}

impl EstimateSettings {
    pub fn resolve(args: &EstimateArgs, config: &Config) -> Result<Self> {
        Ok(Self {
            prior_alpha: args.prior_alpha.unwrap_or(config.prior_alpha),
            prior_beta: args.prior_beta.unwrap_or(config.prior_beta),
            confidence_level: normalize_rate(
                args.confidence.unwrap_or(config.confidence_level),
                "confidence",
            )?,
            target_rate: normalize_rate(args.target.unwrap_or(config.target_rate), "target")?,
        })
    }
}

/// Accept both fractions (`0.95`) and percentages (`95`).
///
/// Exactly `1` reads as either 100% or 1%, so it is rejected.
pub fn normalize_rate(value: f64, name: &str) -> Result<f64> {
    if value == 1.0 {
        return Err(Error::InvalidArgument(format!(
            "{} of 1 is ambiguous; pass 0.01 for 1% or 100 for 100%",
            name
        )));
    }
    if value > 1.0 {
        Ok(value / 100.0)
    } else {
        Ok(value)
    }
}

/// Run the posterior update over a loaded dataset and build the report.
pub fn estimate(dataset: &FunnelDataset, settings: &EstimateSettings) -> Result<FunnelReport> {
    if dataset.is_empty() {
        warn!("No observations; reporting the prior");
    }

    let result = update(
        settings.prior_alpha,
        settings.prior_beta,
        dataset.observations(),
        settings.confidence_level,
    )?;
    metrics::record_observations(dataset.len());

    FunnelReport::build(&result, dataset.totals(), settings.target_rate)
}

/// Main entry point for the CLI. Prints the report to stdout.
pub fn run(args: EstimateArgs, config: &Config) -> Result<FunnelReport> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    run_with_writer(args, config, &mut handle)
}

/// Same as [`run`], printing to `out`. Only the preview and the rendered
/// report go to `out`; status messages are logged.
pub fn run_with_writer<W: Write>(
    args: EstimateArgs,
    config: &Config,
    out: &mut W,
) -> Result<FunnelReport> {
    let format = ReportFormat::parse(args.format.as_deref().unwrap_or(&config.format))?;
    let settings = EstimateSettings::resolve(&args, config)?;

    let mut dataset = FunnelDataset::from_path(&args.input)?;
    if !args.keep_order {
        dataset.sort_by_date();
    }

    let preview_rows = args.preview.unwrap_or(config.preview_rows);
    if format == ReportFormat::Table && preview_rows > 0 && !dataset.is_empty() {
        writeln!(out, "Data preview:")?;
        writeln!(out, "{}", render_preview(dataset.preview(preview_rows)))?;
    }

    let report = estimate(&dataset, &settings)?;
    info!(
        alpha = report.posterior_alpha,
        beta = report.posterior_beta,
        lower = report.interval.lower,
        upper = report.interval.upper,
        confident = report.confident_above_target,
        "Estimate complete"
    );

    let rendered = report.render(format)?;
    writeln!(out, "{}", rendered)?;
    out.flush()?;

    if let Some(path) = args.output.as_deref() {
        persist(path, &rendered)?;
        info!(path = %path.display(), "Report saved");
    }

    if let Some(path) = args.series_csv.as_deref() {
        ensure_parent(path)?;
        let file = fs::File::create(path)?;
        write_series_csv(&report.series, file)?;
        info!(path = %path.display(), steps = report.series.len(), "Series saved");
    }

    Ok(report)
}

pub fn render_preview(observations: &[Observation]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>14} {:>16}\n",
        "date", "funnel_starts", "funnel_converts"
    ));
    for obs in observations {
        out.push_str(&format!(
            "{:<12} {:>14} {:>16}\n",
            obs.date.format("%Y-%m-%d"),
            obs.starts,
            obs.converts
        ));
    }
    out
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn persist(path: &Path, payload: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, payload)?;
    Ok(())
}
