//! Tests for reshape command

use funnel_confidence::commands::estimate::{self, EstimateArgs};
use funnel_confidence::commands::reshape::{self, ReshapeArgs};
use funnel_confidence::{Config, Error};

const EXPORT: &str = "Report: Appointment funnel\n\
Project,Demo\n\
\n\
Range,Last 7 days\n\
Generated by export\n\
Event,2024-01-01,2024-01-02\n\
Appointment Agent Started,10,20\n\
Appointment Agent Booked,2,5\n";

#[test]
fn test_reshape_writes_narrow_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.csv");
    let output = dir.path().join("expected_converted.csv");
    std::fs::write(&input, EXPORT).unwrap();

    reshape::run(
        ReshapeArgs {
            input,
            output: Some(output.clone()),
            ..Default::default()
        },
        &Config::defaults(),
    )
    .unwrap();

    let content = std::fs::read_to_string(output).unwrap();
    assert_eq!(
        content,
        concat!(
            "Date,Appointment Agent Started,Appointment Agent Booked\n",
            "2024-01-01,10,2\n",
            "2024-01-02,20,5\n"
        )
    );
}

#[test]
fn test_reshape_output_feeds_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.csv");
    let funnel = dir.path().join("funnel.csv");
    std::fs::write(&input, EXPORT).unwrap();

    reshape::run(
        ReshapeArgs {
            input,
            output: Some(funnel.clone()),
            funnel: true,
            ..Default::default()
        },
        &Config::defaults(),
    )
    .unwrap();

    let report = estimate::run(
        EstimateArgs {
            input: funnel,
            format: Some("json".to_string()),
            ..Default::default()
        },
        &Config::defaults(),
    )
    .unwrap();
    assert_eq!(report.posterior_alpha, 8.0);
    assert_eq!(report.posterior_beta, 24.0);
    assert_eq!(report.totals.days, 2);
}

#[test]
fn test_reshape_wrong_skip_rows() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.csv");
    std::fs::write(&input, EXPORT).unwrap();

    let result = reshape::render(
        &ReshapeArgs {
            input,
            skip_rows: Some(0),
            ..Default::default()
        },
        &Config::defaults(),
    );
    assert!(matches!(result, Err(Error::SchemaError(_))));
}
