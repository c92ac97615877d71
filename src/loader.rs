//! Delimited-text loading and the column/date/detector filtering applied
//! before classification.
//!
//! A [`Table`] keeps every row as text. [`Table::extract`] turns the rows
//! selected by a [`ColumnMapping`] and [`RowFilter`] into [`Record`]s, in
//! file order, dropping rows whose datetime does not parse.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LoadError, RecordError};
use crate::record::Record;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

// Slash dates read month-first; day-first only when the first field cannot be a month.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Parses a timestamp in any of the accepted layouts.
///
/// Values with a UTC offset keep their wall-clock time in that offset, so
/// date bounds given without an offset compare in the data's own zone.
/// Bare dates resolve to midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Which table columns feed each record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub datetime: String,
    pub speed: String,
    pub occupancy: String,
    pub flow: Option<String>,
    pub detector: Option<String>,
}

fn find_header<'a>(headers: &'a [String], needles: &[&str]) -> Option<&'a String> {
    headers.iter().find(|h| {
        let lower = h.to_lowercase();
        needles.iter().any(|n| lower.contains(n))
    })
}

impl ColumnMapping {
    /// Picks a default column for each field by name.
    ///
    /// Required fields fall back to the first header when nothing matches;
    /// optional fields stay unset.
    pub fn guess(headers: &[String]) -> Result<Self, LoadError> {
        let first = headers.first().ok_or(LoadError::NoHeaders)?;
        let pick = |needles: &[&str]| find_header(headers, needles).unwrap_or(first).clone();

        Ok(Self {
            datetime: pick(&["time", "date"]),
            speed: pick(&["speed"]),
            occupancy: pick(&["occup"]),
            flow: find_header(headers, &["flow"]).cloned(),
            detector: find_header(headers, &["detector", "id"]).cloned(),
        })
    }
}

struct ColumnIndexes {
    datetime: usize,
    speed: usize,
    occupancy: usize,
    flow: Option<usize>,
    detector: Option<usize>,
}

/// Row selection applied during extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Inclusive lower bound; the earliest parsed datetime when unset.
    pub start: Option<NaiveDateTime>,
    /// Inclusive upper bound; the latest parsed datetime when unset.
    pub end: Option<NaiveDateTime>,
    /// Keep only rows whose detector column equals this value.
    pub detector: Option<String>,
}

/// Records pulled out of a [`Table`] plus what was left behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<Record>,
    /// Rows dropped because their datetime did not parse.
    pub dropped_datetime: usize,
    /// Rows dropped because speed or occupancy was not numeric.
    pub rejected: Vec<RecordError>,
    pub warnings: Vec<String>,
    /// The `[start, end]` window that was applied.
    pub window: Option<(NaiveDateTime, NaiveDateTime)>,
}

/// A delimited text table held in memory as strings.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(LoadError::NoHeaders);
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            rows.push(result?);
        }

        debug!(columns = headers.len(), rows = rows.len(), "Table loaded");
        Ok(Self { headers, rows })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        Self::from_reader(bytes)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Result<usize, LoadError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    }

    fn resolve(&self, mapping: &ColumnMapping) -> Result<ColumnIndexes, LoadError> {
        Ok(ColumnIndexes {
            datetime: self.column(&mapping.datetime)?,
            speed: self.column(&mapping.speed)?,
            occupancy: self.column(&mapping.occupancy)?,
            flow: mapping.flow.as_deref().map(|c| self.column(c)).transpose()?,
            detector: mapping
                .detector
                .as_deref()
                .map(|c| self.column(c))
                .transpose()?,
        })
    }

    /// Distinct values of `column`, sorted numerically when every value is
    /// a number and lexically otherwise.
    pub fn detectors(&self, column: &str) -> Result<Vec<String>, LoadError> {
        let idx = self.column(column)?;
        let distinct: BTreeSet<&str> = self
            .rows
            .iter()
            .filter_map(|r| r.get(idx))
            .filter(|v| !v.is_empty())
            .collect();
        let mut values: Vec<String> = distinct.into_iter().map(str::to_string).collect();

        let numeric: Option<Vec<f64>> = values.iter().map(|v| v.parse::<f64>().ok()).collect();
        if let Some(keys) = numeric {
            let mut paired: Vec<(f64, String)> = keys.into_iter().zip(values).collect();
            paired.sort_by(|a, b| a.0.total_cmp(&b.0));
            values = paired.into_iter().map(|(_, v)| v).collect();
        }
        Ok(values)
    }

    /// Earliest and latest parseable datetime in the mapped column.
    pub fn datetime_bounds(
        &self,
        mapping: &ColumnMapping,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, LoadError> {
        let idx = self.column(&mapping.datetime)?;
        Ok(bounds(
            self.rows.iter().filter_map(|r| r.get(idx).and_then(parse_datetime)),
        ))
    }

    /// Converts the selected rows into records.
    ///
    /// Steps run in order: drop rows with an unparseable datetime, keep the
    /// selected detector, keep rows inside the inclusive date window, then
    /// parse speed and occupancy. An end before the start is reported as a
    /// warning and leaves nothing selected.
    #[tracing::instrument(skip(self, filter), fields(rows = self.rows.len()))]
    pub fn extract(
        &self,
        mapping: &ColumnMapping,
        filter: &RowFilter,
    ) -> Result<Extraction, LoadError> {
        let cols = self.resolve(mapping)?;
        let mut out = Extraction::default();

        let mut dated = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            match row.get(cols.datetime).and_then(parse_datetime) {
                Some(dt) => dated.push((row_idx, dt, row)),
                None => out.dropped_datetime += 1,
            }
        }
        if out.dropped_datetime > 0 {
            debug!(dropped = out.dropped_datetime, "Dropped rows with invalid datetime");
        }

        let Some((min, max)) = bounds(dated.iter().map(|(_, dt, _)| *dt)) else {
            return Ok(out);
        };
        let start = filter.start.unwrap_or(min);
        let end = filter.end.unwrap_or(max);
        if end < start {
            let msg = format!("End datetime {end} is before start datetime {start}");
            warn!(%start, %end, "End datetime is before start datetime");
            out.warnings.push(msg);
        }
        out.window = Some((start, end));

        let wanted_detector = match (cols.detector, filter.detector.as_deref()) {
            (Some(idx), Some(value)) => Some((idx, value)),
            _ => None,
        };

        for (row_idx, datetime, row) in dated {
            if let Some((idx, value)) = wanted_detector {
                if row.get(idx) != Some(value) {
                    continue;
                }
            }
            if datetime < start || datetime > end {
                continue;
            }

            let speed = match parse_number(row, cols.speed) {
                Ok(v) => v,
                Err(raw) => {
                    out.rejected.push(RecordError::invalid(row_idx, "speed", raw));
                    continue;
                }
            };
            let occupancy = match parse_number(row, cols.occupancy) {
                Ok(v) => v,
                Err(raw) => {
                    out.rejected
                        .push(RecordError::invalid(row_idx, "occupancy", raw));
                    continue;
                }
            };

            out.records.push(Record {
                datetime,
                speed,
                occupancy,
                flow: cols.flow.and_then(|idx| parse_number(row, idx).ok()),
                detector: cols
                    .detector
                    .and_then(|idx| row.get(idx))
                    .map(str::to_string),
            });
        }

        debug!(
            records = out.records.len(),
            rejected = out.rejected.len(),
            "Extraction complete"
        );
        Ok(out)
    }
}

fn parse_number(row: &StringRecord, idx: usize) -> Result<f64, String> {
    let raw = row.get(idx).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(raw.to_string()),
    }
}

fn bounds<I>(values: I) -> Option<(NaiveDateTime, NaiveDateTime)>
where
    I: IntoIterator<Item = NaiveDateTime>,
{
    values.into_iter().fold(None, |acc, dt| match acc {
        None => Some((dt, dt)),
        Some((lo, hi)) => Some((lo.min(dt), hi.max(dt))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Timestamp,DetectorID,Speed_kmh,Occupancy_pct,Flow_vph
2024-11-22 08:00:00,101,62.0,8.5,1200
2024-11-22 08:05:00,101,44.0,26.0,1650
not a date,101,40.0,30.0,1700
2024-11-22 08:10:00,102,38.0,31.5,
2024-11-22 08:15:00,101,n/a,33.0,1500
2024-11-22 08:20:00,101,36.5,35.0,1450
";

    fn table() -> Table {
        Table::from_bytes(SAMPLE.as_bytes()).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 22)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_datetime_layouts() {
        let expected = at(8, 5);
        assert_eq!(parse_datetime("2024-11-22 08:05:00"), Some(expected));
        assert_eq!(parse_datetime("2024-11-22T08:05:00"), Some(expected));
        assert_eq!(parse_datetime("2024-11-22 08:05"), Some(expected));
        assert_eq!(parse_datetime("22/11/2024 08:05"), Some(expected));
        assert_eq!(parse_datetime("11/22/2024 08:05"), Some(expected));
        assert_eq!(parse_datetime("11/22/2024 08:05:00"), Some(expected));
        assert_eq!(parse_datetime("2024-11-22T08:05:00+01:00"), Some(expected));
        assert_eq!(parse_datetime("2024-11-22 08:05:00.000"), Some(expected));
        assert_eq!(parse_datetime("2024-11-22"), Some(at(0, 0)));
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_parse_datetime_slash_dates_month_first() {
        let jan_second = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("01/02/2024"), Some(jan_second));
        assert_eq!(
            parse_datetime("01/02/2024 08:05"),
            jan_second.date().and_hms_opt(8, 5, 0)
        );
        // first field above 12 can only be a day
        let feb_thirteenth = NaiveDate::from_ymd_opt(2024, 2, 13).unwrap();
        assert_eq!(
            parse_datetime("13/02/2024"),
            feb_thirteenth.and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_extract_us_format_rows() {
        let csv = "time,speed,occupancy\n\
                   11/22/2024 08:00,40,30\n\
                   11/22/2024 08:05,38,32\n";
        let t = Table::from_bytes(csv.as_bytes()).unwrap();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let out = t.extract(&mapping, &RowFilter::default()).unwrap();
        assert_eq!(out.dropped_datetime, 0);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1].datetime, at(8, 5));
    }

    #[test]
    fn test_from_path() {
        let path = std::env::temp_dir().join("vsl_diagram_test_table.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let t = Table::from_path(&path).unwrap();
        assert_eq!(t.len(), 6);
        assert_eq!(t.headers()[0], "Timestamp");
        std::fs::remove_file(&path).unwrap();

        assert!(Table::from_path(&path).is_err());
    }

    #[test]
    fn test_guess_columns() {
        let mapping = ColumnMapping::guess(table().headers()).unwrap();
        assert_eq!(mapping.datetime, "Timestamp");
        assert_eq!(mapping.speed, "Speed_kmh");
        assert_eq!(mapping.occupancy, "Occupancy_pct");
        assert_eq!(mapping.flow.as_deref(), Some("Flow_vph"));
        assert_eq!(mapping.detector.as_deref(), Some("DetectorID"));
    }

    #[test]
    fn test_guess_falls_back_to_first_column() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let mapping = ColumnMapping::guess(&headers).unwrap();
        assert_eq!(mapping.speed, "a");
        assert_eq!(mapping.occupancy, "a");
        assert_eq!(mapping.flow, None);
        assert_eq!(mapping.detector, None);
    }

    #[test]
    fn test_extract_drops_bad_datetime_and_rejects_bad_numbers() {
        let t = table();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let out = t.extract(&mapping, &RowFilter::default()).unwrap();

        assert_eq!(out.dropped_datetime, 1);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index(), 4);
        assert_eq!(out.records.len(), 4);
        assert_eq!(out.records[0].flow, Some(1200.0));
        assert_eq!(out.records[2].flow, None);
        assert_eq!(out.records[2].detector.as_deref(), Some("102"));
        assert_eq!(out.window, Some((at(8, 0), at(8, 20))));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_extract_detector_and_window() {
        let t = table();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let filter = RowFilter {
            start: Some(at(8, 5)),
            end: Some(at(8, 20)),
            detector: Some("101".to_string()),
        };
        let out = t.extract(&mapping, &filter).unwrap();
        let times: Vec<NaiveDateTime> = out.records.iter().map(|r| r.datetime).collect();
        assert_eq!(times, vec![at(8, 5), at(8, 20)]);
    }

    #[test]
    fn test_extract_end_before_start_warns_and_is_empty() {
        let t = table();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let filter = RowFilter {
            start: Some(at(8, 20)),
            end: Some(at(8, 0)),
            detector: None,
        };
        let out = t.extract(&mapping, &filter).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_extract_missing_column() {
        let t = table();
        let mut mapping = ColumnMapping::guess(t.headers()).unwrap();
        mapping.speed = "velocity".to_string();
        assert!(matches!(
            t.extract(&mapping, &RowFilter::default()),
            Err(LoadError::MissingColumn(c)) if c == "velocity"
        ));
    }

    #[test]
    fn test_extract_keeps_file_order_and_duplicates() {
        let csv = "time,speed,occupancy\n\
                   2024-11-22 08:10:00,50,10\n\
                   2024-11-22 08:00:00,40,30\n\
                   2024-11-22 08:00:00,41,29\n";
        let t = Table::from_bytes(csv.as_bytes()).unwrap();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let out = t.extract(&mapping, &RowFilter::default()).unwrap();
        let speeds: Vec<f64> = out.records.iter().map(|r| r.speed).collect();
        assert_eq!(speeds, vec![50.0, 40.0, 41.0]);
    }

    #[test]
    fn test_extract_no_valid_dates() {
        let csv = "time,speed,occupancy\nbad,50,10\n";
        let t = Table::from_bytes(csv.as_bytes()).unwrap();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        let out = t.extract(&mapping, &RowFilter::default()).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.dropped_datetime, 1);
        assert_eq!(out.window, None);
    }

    #[test]
    fn test_detectors_sorted_numerically() {
        let csv = "id,speed\n10,1\n9,1\n10,1\n100,1\n";
        let t = Table::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(t.detectors("id").unwrap(), vec!["9", "10", "100"]);
    }

    #[test]
    fn test_datetime_bounds() {
        let t = table();
        let mapping = ColumnMapping::guess(t.headers()).unwrap();
        assert_eq!(
            t.datetime_bounds(&mapping).unwrap(),
            Some((at(8, 0), at(8, 20)))
        );
    }

    #[test]
    fn test_empty_input_has_no_headers() {
        assert!(matches!(
            Table::from_bytes(b""),
            Err(LoadError::NoHeaders)
        ));
    }
}
