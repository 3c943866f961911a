//! Standalone reshape tool for wide event exports.
//!
//! Usage:
//!   cargo run --bin reshape_csv -- export.csv expected_converted.csv

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use funnel_confidence::commands::reshape::{run, ReshapeArgs};
use funnel_confidence::Config;

#[derive(Parser, Debug)]
#[command(name = "reshape_csv")]
#[command(about = "Transpose a wide event export into one row per date")]
struct Args {
    /// Wide export CSV
    input: PathBuf,

    /// Output CSV (stdout if omitted)
    output: Option<PathBuf>,

    /// Metadata lines before the Event header
    #[arg(long, env = "FUNNEL_SKIP_ROWS")]
    skip_rows: Option<usize>,

    /// Emit date,funnel_starts,funnel_converts instead of one column per event
    #[arg(long, default_value_t = false)]
    funnel: bool,
}

fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("funnel_confidence=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::new();

    run(
        ReshapeArgs {
            input: args.input,
            output: args.output,
            skip_rows: args.skip_rows,
            funnel: args.funnel,
            ..Default::default()
        },
        &config,
    )?;

    Ok(())
}
