//! Output formatting and persistence for classified points.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::classify::{Classification, PointState};
use crate::record::Record;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One exported row: the source record joined with its classification.
#[derive(Debug, Serialize)]
pub struct PointRow<'a> {
    pub datetime: NaiveDateTime,
    pub detector: Option<&'a str>,
    pub speed: f64,
    pub occupancy: f64,
    pub flow: Option<f64>,
    pub state: PointState,
    pub streak: u32,
}

/// Pairs each classified point with the record it came from.
pub fn point_rows<'a>(records: &'a [Record], classification: &Classification) -> Vec<PointRow<'a>> {
    classification
        .points
        .iter()
        .filter_map(|p| {
            let record = records.get(p.index)?;
            Some(PointRow {
                datetime: record.datetime,
                detector: record.detector.as_deref(),
                speed: p.speed,
                occupancy: p.occupancy,
                flow: record.flow,
                state: p.state,
                streak: p.streak,
            })
        })
        .collect()
}

/// Logs a classification using Rust's debug pretty-print format.
pub fn print_pretty(classification: &Classification) {
    debug!("{:#?}", classification);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends classified points as rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_points(path: &str, rows: &[PointRow<'_>]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV rows");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
