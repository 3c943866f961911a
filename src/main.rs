//! Funnel Confidence CLI - main entry point
//!
//! Estimate the conversion rate of a funnel with a Bayesian credibility
//! interval, or reshape a wide event export into the funnel input schema.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use funnel_confidence::commands::{self, EstimateArgs, ReshapeArgs};
use funnel_confidence::{metrics, Config};

#[derive(Parser)]
#[command(name = "funnel_confidence")]
#[command(about = "Funnel Conversion Confidence Estimator", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to funnel.yml in the current or parent directory)
    #[arg(long, global = true, env = "FUNNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Write Prometheus metrics to this file after the command finishes
    #[arg(long, global = true, env = "METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the conversion rate credibility interval from daily funnel data
    Estimate {
        /// CSV with date, funnel_starts and funnel_converts columns
        input: PathBuf,

        /// Confidence level, as a fraction (0.95) or percent (95); 1 is rejected
        #[arg(short, long)]
        confidence: Option<f64>,

        /// Target conversion rate, as a fraction (0.2) or percent (20); 1 is rejected
        #[arg(short, long)]
        target: Option<f64>,

        /// Prior alpha
        #[arg(long)]
        prior_alpha: Option<f64>,

        /// Prior beta
        #[arg(long)]
        prior_beta: Option<f64>,

        /// Output format: table | json | yaml | markdown
        #[arg(short, long)]
        format: Option<String>,

        /// Optional output file to save the report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the per-day interval series as CSV
        #[arg(long)]
        series_csv: Option<PathBuf>,

        /// Fold rows in file order instead of sorting by date
        #[arg(long, default_value_t = false)]
        keep_order: bool,

        /// Rows to show in the data preview (0 disables it)
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Reshape a wide event export (one column per date) into one row per date
    Reshape {
        /// Wide export CSV
        input: PathBuf,

        /// Output CSV (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Metadata lines before the Event header
        #[arg(long)]
        skip_rows: Option<usize>,

        /// Emit date,funnel_starts,funnel_converts for the estimate command
        #[arg(long, default_value_t = false)]
        funnel: bool,

        /// Event counted as funnel start
        #[arg(long)]
        starts_event: Option<String>,

        /// Event counted as conversion
        #[arg(long)]
        converts_event: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Estimate { .. } => "estimate",
            Commands::Reshape { .. } => "reshape",
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays usable for CSV output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("funnel_confidence=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(path)?,
        None => Config::new(),
    };

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command, &config);

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    if let Some(path) = cli.metrics_file.as_deref() {
        if let Err(err) = metrics::write_textfile(path) {
            warn!(path = %path.display(), "Failed to write metrics: {}", err);
        }
    }

    result
}

fn execute_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Estimate {
            input,
            confidence,
            target,
            prior_alpha,
            prior_beta,
            format,
            output,
            series_csv,
            keep_order,
            preview,
        } => {
            commands::estimate::run(
                EstimateArgs {
                    input,
                    confidence,
                    target,
                    prior_alpha,
                    prior_beta,
                    format,
                    output,
                    series_csv,
                    keep_order,
                    preview,
                },
                config,
            )?;
        }
        Commands::Reshape {
            input,
            output,
            skip_rows,
            funnel,
            starts_event,
            converts_event,
        } => {
            commands::reshape::run(
                ReshapeArgs {
                    input,
                    output,
                    skip_rows,
                    funnel,
                    starts_event,
                    converts_event,
                },
                config,
            )?;
        }
    }

    Ok(())
}
