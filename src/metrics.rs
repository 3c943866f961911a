//! Prometheus metrics for the funnel confidence CLI.
//!
//! Exposes:
//! - `funnel_confidence_command_duration_seconds` (histogram)
//! - `funnel_confidence_command_total` (counter with status)
//! - `funnel_confidence_command_inflight` (gauge)
//! - `funnel_confidence_observations_total` (counter)
//! - `funnel_confidence_reshaped_rows_total` (counter)
//! - process metrics via `process` collector (Linux only)
//!
//! Metrics are written in the Prometheus text format to a file, suitable for
//! the node_exporter textfile collector.

use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use tracing::{info, warn};

use crate::{Error, Result};

#[cfg(target_os = "linux")]
static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    use prometheus::process_collector::ProcessCollector;

    if let Err(err) =
        prometheus::default_registry().register(Box::new(ProcessCollector::for_self()))
    {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1ms up to ~16s.
    let buckets = prometheus::exponential_buckets(0.001, 2.0, 15)
        .expect("failed to create histogram buckets");
    register_histogram_vec!(
        "funnel_confidence_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "funnel_confidence_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "funnel_confidence_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static OBSERVATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "funnel_confidence_observations_total",
        "Daily observations folded into a posterior"
    )
    .expect("failed to register observations counter")
});

static RESHAPED_ROWS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "funnel_confidence_reshaped_rows_total",
        "Narrow rows produced by the reshape transform"
    )
    .expect("failed to register reshaped rows counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    #[cfg(target_os = "linux")]
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&OBSERVATIONS_TOTAL);
    Lazy::force(&RESHAPED_ROWS_TOTAL);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

pub fn record_observations(count: usize) {
    init_collectors();
    OBSERVATIONS_TOTAL.inc_by(count as u64);
}

pub fn record_reshaped_rows(count: usize) {
    init_collectors();
    RESHAPED_ROWS_TOTAL.inc_by(count as u64);
}

/// Encode all registered metrics in the Prometheus text format.
pub fn render() -> Result<String> {
    init_collectors();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::SerializationError(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| Error::SerializationError(format!("Metrics are not UTF-8: {}", e)))
}

/// Write the current metrics snapshot to `path`.
pub fn write_textfile<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let payload = render()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, payload)?;
    info!(path = %path.display(), "Metrics written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_registered_metrics() {
        record_command_start("test_render");
        record_command_result("test_render", Duration::from_millis(5), true);
        record_observations(3);

        let text = render().unwrap();
        assert!(text.contains("funnel_confidence_command_total"));
        assert!(text.contains("command=\"test_render\""));
        assert!(text.contains("funnel_confidence_observations_total"));
        assert!(text.contains("funnel_confidence_command_duration_seconds"));
    }

    #[test]
    fn error_status_is_labelled() {
        record_command_start("test_error");
        record_command_result("test_error", Duration::from_millis(1), false);

        let text = render().unwrap();
        assert!(text.contains("status=\"error\""));
    }

    #[test]
    fn write_textfile_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("funnel.prom");

        record_reshaped_rows(2);
        write_textfile(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("funnel_confidence_reshaped_rows_total"));
    }
}
