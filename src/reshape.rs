//! Wide-to-narrow reshaping of exported event CSVs.
//!
//! Event exports look like this (after a few metadata lines):
//!
//! ```text
//! Event,2024-01-01,2024-01-02
//! Appointment Agent Started,10,20
//! Appointment Agent Booked,2,5
//! ```
//!
//! The reshaped table has one row per date and one column per event:
//!
//! ```text
//! Date,Appointment Agent Started,Appointment Agent Booked
//! 2024-01-01,10,2
//! 2024-01-02,20,5
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::analytics::funnel::parse_date;
use crate::analytics::posterior::Observation;
use crate::{Error, Result};

/// Metadata lines preceding the header in a raw export.
pub const DEFAULT_SKIP_ROWS: usize = 5;
pub const EVENT_COLUMN: &str = "Event";
pub const DATE_HEADER: &str = "Date";
pub const DEFAULT_STARTS_EVENT: &str = "Appointment Agent Started";
pub const DEFAULT_CONVERTS_EVENT: &str = "Appointment Agent Booked";

/// One date of the reshaped table; `counts` follow the table's event order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrowRow {
    pub date: String,
    pub counts: Vec<u64>,
}

/// Narrow table: one row per date, one column per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrowTable {
    events: Vec<String>,
    rows: Vec<NarrowRow>,
}

fn clean_cell(cell: &str) -> &str {
    cell.trim().trim_matches('"')
}

/// Reshape a wide export read from `reader`, skipping `skip_rows` leading lines.
///
/// `skip_rows` counts physical lines, not CSV records: a quoted metadata
/// cell spanning two lines uses up two of the skipped rows.
///
/// # Errors
///
/// Returns [`Error::SchemaError`] for malformed exports, including input that
/// is not valid UTF-8.
pub fn reshape<R: Read>(mut reader: R, skip_rows: usize) -> Result<NarrowTable> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let raw = String::from_utf8(bytes)
        .map_err(|e| Error::SchemaError(format!("export is not valid UTF-8: {}", e)))?;

    let body: String = raw.split_inclusive('\n').skip(skip_rows).collect();

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut records = csv_reader.records();

    let header = records
        .next()
        .transpose()?
        .ok_or_else(|| {
            Error::SchemaError(format!("no header row after skipping {} lines", skip_rows))
        })?;
    let header: Vec<String> = header.iter().map(|c| clean_cell(c).to_string()).collect();

    let event_idx = header
        .iter()
        .position(|h| h == EVENT_COLUMN)
        .ok_or_else(|| Error::SchemaError(format!("missing '{}' column", EVENT_COLUMN)))?;

    let date_columns: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != event_idx && !name.is_empty())
        .map(|(idx, name)| (idx, name.clone()))
        .collect();
    if date_columns.is_empty() {
        return Err(Error::SchemaError("no date columns in header".to_string()));
    }

    let mut events: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    // counts_by_event[e][d] = count of event e on date column d
    let mut counts_by_event: Vec<Vec<u64>> = Vec::new();

    for (offset, record) in records.enumerate() {
        let record = record?;
        let line = skip_rows + offset + 2;
        let cells: Vec<&str> = record.iter().map(clean_cell).collect();

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        if cells.iter().skip(header.len()).any(|c| !c.is_empty()) {
            return Err(Error::SchemaError(format!(
                "line {}: row has {} cells but header has {}",
                line,
                cells.len(),
                header.len()
            )));
        }

        let event = cells.get(event_idx).copied().unwrap_or_default();
        if event.is_empty() {
            return Err(Error::SchemaError(format!(
                "line {}: empty '{}' value",
                line, EVENT_COLUMN
            )));
        }
        if !seen.insert(event.to_string()) {
            return Err(Error::SchemaError(format!(
                "line {}: duplicate event '{}'",
                line, event
            )));
        }

        let counts = date_columns
            .iter()
            .map(|(idx, date)| {
                let cell = cells.get(*idx).copied().unwrap_or_default();
                cell.parse::<u64>().map_err(|_| {
                    Error::SchemaError(format!(
                        "line {}: '{}' on {} is not a non-negative integer: '{}'",
                        line, event, date, cell
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(event, dates = counts.len(), "Parsed event row");
        events.push(event.to_string());
        counts_by_event.push(counts);
    }

    if events.is_empty() {
        return Err(Error::SchemaError("no event rows found".to_string()));
    }

    let rows = date_columns
        .into_iter()
        .enumerate()
        .map(|(d, (_, date))| NarrowRow {
            date,
            counts: counts_by_event.iter().map(|counts| counts[d]).collect(),
        })
        .collect();

    Ok(NarrowTable { events, rows })
}

/// Reshape a wide export file.
pub fn reshape_file<P: AsRef<Path>>(path: P, skip_rows: usize) -> Result<NarrowTable> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let table = reshape(file, skip_rows)?;
    info!(
        path = %path.display(),
        events = table.events.len(),
        dates = table.rows.len(),
        "Reshaped wide export"
    );
    Ok(table)
}

impl NarrowTable {
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn rows(&self) -> &[NarrowRow] {
        &self.rows
    }

    fn event_index(&self, event: &str) -> Result<usize> {
        self.events.iter().position(|e| e == event).ok_or_else(|| {
            Error::SchemaError(format!(
                "event '{}' not found; available: {}",
                event,
                self.events.join(", ")
            ))
        })
    }

    /// Per-date counts of a single event.
    pub fn event_counts(&self, event: &str) -> Result<Vec<u64>> {
        let idx = self.event_index(event)?;
        Ok(self.rows.iter().map(|row| row.counts[idx]).collect())
    }

    /// Write as `Date,<event>,...` CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);

        let mut header = vec![DATE_HEADER.to_string()];
        header.extend(self.events.iter().cloned());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.date.clone()];
            record.extend(row.counts.iter().map(|c| c.to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Map two events onto funnel observations (starts, converts).
    pub fn to_observations(
        &self,
        starts_event: &str,
        converts_event: &str,
    ) -> Result<Vec<Observation>> {
        let starts_idx = self.event_index(starts_event)?;
        let converts_idx = self.event_index(converts_event)?;

        self.rows
            .iter()
            .map(|row| {
                let date = parse_date(&row.date)?;
                Observation::new(date, row.counts[starts_idx], row.counts[converts_idx])
            })
            .collect()
    }
}
