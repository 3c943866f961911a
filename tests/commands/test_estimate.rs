//! Tests for estimate command

use std::path::PathBuf;

use funnel_confidence::commands::estimate::{self, EstimateArgs, EstimateSettings};
use funnel_confidence::{Config, Error};

fn write_input(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("funnel.csv");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_estimate_single_day() {
    let dir = tempfile::tempdir().unwrap();
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n2024-01-01,100,20\n"),
        format: Some("json".to_string()),
        ..Default::default()
    };

    let report = estimate::run(args, &Config::defaults()).unwrap();
    assert_eq!(report.posterior_alpha, 21.0);
    assert_eq!(report.posterior_beta, 81.0);
    assert!((report.interval.lower - 0.1336).abs() < 1e-3);
    assert!((report.interval.upper - 0.2891).abs() < 1e-3);
    assert!(!report.confident_above_target);
}

#[test]
fn test_estimate_rejects_converts_above_starts() {
    let dir = tempfile::tempdir().unwrap();
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n2024-01-01,20,30\n"),
        ..Default::default()
    };

    assert!(matches!(
        estimate::run(args, &Config::defaults()),
        Err(Error::InvalidObservation(_))
    ));
}

#[test]
fn test_estimate_header_only_reports_prior() {
    let dir = tempfile::tempdir().unwrap();
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n"),
        format: Some("markdown".to_string()),
        ..Default::default()
    };

    let report = estimate::run(args, &Config::defaults()).unwrap();
    assert!(report.series.is_empty());
    assert_eq!(report.posterior_alpha, 1.0);
    assert_eq!(report.posterior_beta, 1.0);
    assert_eq!(report.totals.observed_rate, None);
}

#[test]
fn test_estimate_percent_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n2024-01-01,100,40\n"),
        confidence: Some(90.0),
        target: Some(25.0),
        format: Some("yaml".to_string()),
        ..Default::default()
    };

    let report = estimate::run(args, &Config::defaults()).unwrap();
    assert_eq!(report.confidence_level, 0.9);
    assert_eq!(report.target_rate, 0.25);
    assert!(report.confident_above_target);
}

#[test]
fn test_estimate_rejects_ambiguous_target_of_one() {
    let dir = tempfile::tempdir().unwrap();
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n2024-01-01,100,20\n"),
        target: Some(1.0),
        format: Some("json".to_string()),
        ..Default::default()
    };

    assert!(matches!(
        estimate::run(args, &Config::defaults()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_estimate_json_stdout_is_pure_json_when_saving() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.json");
    let series = dir.path().join("series.csv");
    let args = EstimateArgs {
        input: write_input(&dir, "date,funnel_starts,funnel_converts\n2024-01-01,100,20\n"),
        format: Some("json".to_string()),
        output: Some(output.clone()),
        series_csv: Some(series),
        ..Default::default()
    };

    let mut stdout = Vec::new();
    estimate::run_with_writer(args, &Config::defaults(), &mut stdout).unwrap();

    let printed: serde_json::Value = serde_json::from_slice(&stdout).unwrap();
    assert_eq!(printed["posterior_alpha"], 21.0);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
    assert_eq!(saved, printed);
}

#[test]
fn test_settings_follow_config() {
    let config = Config {
        prior_alpha: 2.0,
        prior_beta: 8.0,
        ..Config::defaults()
    };
    let settings = EstimateSettings::resolve(&EstimateArgs::default(), &config).unwrap();
    assert_eq!(settings.prior_alpha, 2.0);
    assert_eq!(settings.prior_beta, 8.0);
}

#[test]
fn test_estimate_missing_file() {
    let args = EstimateArgs {
        input: PathBuf::from("/nonexistent/funnel.csv"),
        ..Default::default()
    };
    assert!(matches!(
        estimate::run(args, &Config::defaults()),
        Err(Error::IoError(_))
    ));
}
