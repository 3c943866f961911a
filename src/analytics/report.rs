//! Conversion confidence report: final posterior, target-rate verdict and
//! the per-day interval series, rendered as table, JSON, YAML or Markdown.

use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use super::funnel::FunnelTotals;
use super::posterior::{CredibilityInterval, PosteriorUpdate, StepResult};
use crate::{Error, Result};

/// Default target conversion rate.
pub const DEFAULT_TARGET_RATE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Table,
    Json,
    Yaml,
    Markdown,
}

impl ReportFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(Error::InvalidArgument(format!(
                "Unsupported format '{}'. Use table|json|yaml|markdown",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelReport {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub confidence_level: f64,
    pub target_rate: f64,
    pub posterior_alpha: f64,
    pub posterior_beta: f64,
    pub posterior_mean: f64,
    pub interval: CredibilityInterval,
    pub probability_above_target: f64,
    pub confident_above_target: bool,
    pub totals: FunnelTotals,
    pub series: Vec<StepResult>,
}

impl FunnelReport {
    /// Assemble a report from a finished update.
    ///
    /// The rate counts as confidently above target only when the lower
    /// bound of the final interval is strictly greater than `target_rate`.
    pub fn build(update: &PosteriorUpdate, totals: FunnelTotals, target_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&target_rate) {
            return Err(Error::InvalidArgument(format!(
                "target rate must be in [0, 1], got {}",
                target_rate
            )));
        }

        let interval = update.final_interval()?;
        Ok(Self {
            prior_alpha: update.prior.alpha(),
            prior_beta: update.prior.beta(),
            confidence_level: update.confidence_level,
            target_rate,
            posterior_alpha: update.final_alpha(),
            posterior_beta: update.final_beta(),
            posterior_mean: update.posterior.mean(),
            interval,
            probability_above_target: update.posterior.probability_above(target_rate)?,
            confident_above_target: interval.lower > target_rate,
            totals,
            series: update.steps.clone(),
        })
    }

    pub fn verdict(&self) -> String {
        let confidence = self.confidence_level * 100.0;
        let target = self.target_rate * 100.0;
        if self.confident_above_target {
            format!(
                "We are {:.1}% confident that the conversion rate is above {:.1}%.",
                confidence, target
            )
        } else {
            format!(
                "We are not {:.1}% confident that the conversion rate is above {:.1}%.",
                confidence, target
            )
        }
    }

    pub fn lower_bound_series(&self) -> Vec<(NaiveDate, f64)> {
        self.series
            .iter()
            .map(|step| (step.date, step.interval.lower))
            .collect()
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Table => Ok(self.render_table()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Yaml => Ok(serde_yaml::to_string(self)?),
            ReportFormat::Markdown => Ok(self.render_markdown()),
        }
    }

    fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Prior: Beta({}, {})\n",
            self.prior_alpha, self.prior_beta
        ));
        out.push_str(&format!("Posterior Alpha: {}\n", self.posterior_alpha));
        out.push_str(&format!("Posterior Beta: {}\n", self.posterior_beta));
        out.push_str(&format!("Posterior Mean: {:.4}\n", self.posterior_mean));
        out.push_str(&format!(
            "{:.1}% Credibility Interval: ({:.4}, {:.4})\n",
            self.confidence_level * 100.0,
            self.interval.lower,
            self.interval.upper
        ));
        out.push_str(&format!(
            "P(rate > {:.1}%): {:.4}\n",
            self.target_rate * 100.0,
            self.probability_above_target
        ));
        out.push_str(&self.verdict());
        out.push_str("\n\n");

        out.push_str(&format!(
            "{:<4} {:<12} {:>10} {:>10} {:>8} {:>8}\n",
            "#", "Date", "Alpha", "Beta", "Lower", "Upper"
        ));
        out.push_str(&"-".repeat(57));
        out.push('\n');

        for (idx, step) in self.series.iter().enumerate() {
            out.push_str(&format!(
                "{:<4} {:<12} {:>10} {:>10} {:>8.4} {:>8.4}\n",
                idx + 1,
                step.date.format("%Y-%m-%d"),
                step.alpha,
                step.beta,
                step.interval.lower,
                step.interval.upper
            ));
        }

        out
    }

    fn render_markdown(&self) -> String {
        let mut lines = Vec::new();
        let confidence = self.confidence_level * 100.0;

        lines.push("# Funnel Conversion Confidence".to_string());
        lines.push(String::new());
        lines.push(format!(
            "- Days: {} | Starts: {} | Converts: {}",
            self.totals.days, self.totals.starts, self.totals.converts
        ));
        if let Some(rate) = self.totals.observed_rate {
            lines.push(format!("- Observed rate: {:.2}%", rate * 100.0));
        }
        lines.push(format!(
            "- Prior: Beta({}, {}) → Posterior: Beta({}, {})",
            self.prior_alpha, self.prior_beta, self.posterior_alpha, self.posterior_beta
        ));
        lines.push(format!(
            "- {:.1}% credibility interval: [{:.4}, {:.4}]",
            confidence, self.interval.lower, self.interval.upper
        ));
        lines.push(format!(
            "- P(rate > {:.1}%): {:.4}",
            self.target_rate * 100.0,
            self.probability_above_target
        ));
        lines.push(String::new());
        lines.push(format!("**{}**", self.verdict()));
        lines.push(String::new());

        if !self.series.is_empty() {
            lines.push(format!(
                "**Lower bound of {:.1}% credibility interval over time**",
                confidence
            ));
            lines.push("| Date | Alpha | Beta | Lower | Upper |".to_string());
            lines.push("| --- | --- | --- | --- | --- |".to_string());
            for step in &self.series {
                lines.push(format!(
                    "| {} | {} | {} | {:.4} | {:.4} |",
                    step.date, step.alpha, step.beta, step.interval.lower, step.interval.upper
                ));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[derive(Serialize)]
struct SeriesRow {
    date: NaiveDate,
    alpha: f64,
    beta: f64,
    lower: f64,
    upper: f64,
}

/// Write the per-step series as `date,alpha,beta,lower,upper`.
pub fn write_series_csv<W: Write>(steps: &[StepResult], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for step in steps {
        writer.serialize(SeriesRow {
            date: step.date,
            alpha: step.alpha,
            beta: step.beta,
            lower: step.interval.lower,
            upper: step.interval.upper,
        })?;
    }
    writer.flush()?;
    Ok(())
}
