//! Reshape command: wide event export in, narrow per-date CSV out.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::analytics::funnel::write_funnel_csv;
use crate::config::Config;
use crate::metrics;
use crate::reshape::reshape_file;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct ReshapeArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub skip_rows: Option<usize>,
    /// Emit `date,funnel_starts,funnel_converts` instead of one column per event
    pub funnel: bool,
    pub starts_event: Option<String>,
    pub converts_event: Option<String>,
}

/// Reshape `args.input` and return the CSV payload.
pub fn render(args: &ReshapeArgs, config: &Config) -> Result<Vec<u8>> {
    let skip_rows = args.skip_rows.unwrap_or(config.skip_rows);
    let table = reshape_file(&args.input, skip_rows)?;
    metrics::record_reshaped_rows(table.rows().len());

    let mut buffer = Vec::new();
    if args.funnel {
        let starts_event = args.starts_event.as_deref().unwrap_or(&config.starts_event);
        let converts_event = args
            .converts_event
            .as_deref()
            .unwrap_or(&config.converts_event);
        let observations = table.to_observations(starts_event, converts_event)?;
        write_funnel_csv(&observations, &mut buffer)?;
    } else {
        table.write_csv(&mut buffer)?;
    }

    Ok(buffer)
}

/// Main entry point for the CLI. Writes to `args.output` or stdout.
pub fn run(args: ReshapeArgs, config: &Config) -> Result<()> {
    let payload = render(&args, config)?;

    match args.output.as_deref() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, &payload)?;
            info!(path = %path.display(), bytes = payload.len(), "Reshaped CSV saved");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&payload)?;
            handle.flush()?;
        }
    }

    Ok(())
}
