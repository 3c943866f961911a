//! Funnel dataset loading.
//!
//! Reads the `date,funnel_starts,funnel_converts` CSV and validates every row
//! into an [`Observation`] before it reaches the posterior updater.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::info;

use super::posterior::Observation;
use crate::{Error, Result};

pub const DATE_COLUMN: &str = "date";
pub const STARTS_COLUMN: &str = "funnel_starts";
pub const CONVERTS_COLUMN: &str = "funnel_converts";
pub const REQUIRED_COLUMNS: [&str; 3] = [DATE_COLUMN, STARTS_COLUMN, CONVERTS_COLUMN];

/// Default number of rows shown in a preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a date cell, keeping only the date part of timestamps.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts.date());
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.date_naive());
    }

    Err(Error::SchemaError(format!("unparseable date '{}'", raw)))
}

/// Aggregate counts over the whole dataset.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunnelTotals {
    pub days: usize,
    pub starts: u64,
    pub converts: u64,
    pub observed_rate: Option<f64>,
}

/// Validated daily funnel data.
#[derive(Debug, Clone, Default)]
pub struct FunnelDataset {
    observations: Vec<Observation>,
}

impl FunnelDataset {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    /// Load a funnel CSV from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            "Loaded funnel data"
        );
        Ok(dataset)
    }

    /// Load a funnel CSV from any reader. Extra columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let (Some(date_idx), Some(starts_idx), Some(converts_idx)) = (
            position(DATE_COLUMN),
            position(STARTS_COLUMN),
            position(CONVERTS_COLUMN),
        ) else {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|name| position(name).is_none())
                .collect();
            return Err(Error::SchemaError(format!(
                "CSV must contain '{}', '{}' and '{}' columns; missing: {}",
                DATE_COLUMN,
                STARTS_COLUMN,
                CONVERTS_COLUMN,
                missing.join(", ")
            )));
        };

        let mut observations = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            // Header is line 1.
            let line = idx + 2;

            let date = parse_date(record.get(date_idx).unwrap_or_default())
                .map_err(|e| Error::SchemaError(format!("row {}: {}", line, e)))?;
            let starts = parse_count(record.get(starts_idx), STARTS_COLUMN, line)?;
            let converts = parse_count(record.get(converts_idx), CONVERTS_COLUMN, line)?;

            let observation =
                Observation::from_signed(date, starts, converts).map_err(|e| match e {
                    Error::InvalidObservation(msg) => {
                        Error::InvalidObservation(format!("row {}: {}", line, msg))
                    }
                    other => other,
                })?;
            observations.push(observation);
        }

        Ok(Self { observations })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Stable sort by date; rows sharing a date keep their file order.
    pub fn sort_by_date(&mut self) {
        self.observations.sort_by_key(|o| o.date);
    }

    /// First `rows` observations.
    pub fn preview(&self, rows: usize) -> &[Observation] {
        &self.observations[..rows.min(self.observations.len())]
    }

    /// Sums saturate at `u64::MAX`; the observed rate uses exact sums.
    pub fn totals(&self) -> FunnelTotals {
        let (starts, converts) = self
            .observations
            .iter()
            .fold((0u128, 0u128), |(starts, converts), o| {
                (starts + u128::from(o.starts), converts + u128::from(o.converts))
            });
        FunnelTotals {
            days: self.observations.len(),
            starts: u64::try_from(starts).unwrap_or(u64::MAX),
            converts: u64::try_from(converts).unwrap_or(u64::MAX),
            observed_rate: (starts > 0).then(|| converts as f64 / starts as f64),
        }
    }
}

fn parse_count(raw: Option<&str>, column: &str, line: usize) -> Result<i64> {
    let raw = raw.unwrap_or_default();
    raw.parse::<i64>().map_err(|_| {
        Error::SchemaError(format!(
            "row {}: '{}' value '{}' is not an integer",
            line, column, raw
        ))
    })
}

#[derive(Serialize)]
struct FunnelRow {
    date: NaiveDate,
    funnel_starts: u64,
    funnel_converts: u64,
}

/// Write observations in the `date,funnel_starts,funnel_converts` schema.
pub fn write_funnel_csv<W: Write>(observations: &[Observation], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for observation in observations {
        writer.serialize(FunnelRow {
            date: observation.date,
            funnel_starts: observation.starts,
            funnel_converts: observation.converts,
        })?;
    }
    writer.flush()?;
    Ok(())
}
