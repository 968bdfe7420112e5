//! CSV ingestion for series whose units are already normalized.
//!
//! One column is the time axis in seconds; every other column becomes a
//! channel. Cells that do not parse as numbers become NaN so the engine can
//! reject them when they land in the time or weight channel.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{TimeSeries, WindowError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestOptions {
    pub time_channel: String,
    /// Replacement for empty cells; `None` leaves them as NaN.
    pub fill_missing: Option<f64>,
    /// Shift time so the first sample is at zero.
    pub zero_base: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            time_channel: "Time secs".to_string(),
            fill_missing: None,
            zero_base: true,
        }
    }
}

pub fn read_csv_file(path: &Path, options: &IngestOptions) -> Result<TimeSeries, WindowError> {
    let file = File::open(path).map_err(|e| WindowError::Io(format!("{}: {e}", path.display())))?;
    read_csv_series(file, options)
}

pub fn read_csv_series<R: Read>(
    reader: R,
    options: &IngestOptions,
) -> Result<TimeSeries, WindowError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| WindowError::Csv(e.to_string()))?
        .clone();

    let mut seen = BTreeSet::new();
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(WindowError::DuplicateColumn(name.to_string()));
        }
    }
    let time_idx = headers
        .iter()
        .position(|h| h == options.time_channel)
        .ok_or_else(|| WindowError::MissingChannel(options.time_channel.clone()))?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for record in csv_reader.records() {
        let record = record.map_err(|e| WindowError::Csv(e.to_string()))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(parse_cell(record.get(idx).unwrap_or(""), options.fill_missing));
        }
    }

    let mut time = std::mem::take(&mut columns[time_idx]);
    if options.zero_base {
        if let Some(&t0) = time.first() {
            if t0.is_finite() {
                time.iter_mut().for_each(|t| *t -= t0);
            }
        }
    }

    let mut series = TimeSeries::new(time);
    for (idx, (name, values)) in headers.iter().zip(columns).enumerate() {
        if idx != time_idx {
            series.insert_channel(name, values)?;
        }
    }
    Ok(series)
}

fn parse_cell(cell: &str, fill_missing: Option<f64>) -> f64 {
    if cell.is_empty() {
        fill_missing.unwrap_or(f64::NAN)
    } else {
        cell.parse().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Time secs,Power hp,Tailpipe NOX g/s,Vehicle Speed MPH
100,10,0.1,0
101,20,,5
,,,
102,abc,0.3,10
";

    #[test]
    fn reads_columns_and_zero_bases_time() {
        let series = read_csv_series(SAMPLE.as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.time(), &[0.0, 1.0, 2.0]);
        let names: Vec<&str> = series.channel_names().collect();
        assert_eq!(names, vec!["Power hp", "Tailpipe NOX g/s", "Vehicle Speed MPH"]);
        assert_eq!(series.channel("Vehicle Speed MPH").unwrap(), &[0.0, 5.0, 10.0]);
    }

    #[test]
    fn empty_and_malformed_cells_become_nan() {
        let series = read_csv_series(SAMPLE.as_bytes(), &IngestOptions::default()).unwrap();
        assert!(series.channel("Tailpipe NOX g/s").unwrap()[1].is_nan());
        assert!(series.channel("Power hp").unwrap()[2].is_nan());
    }

    #[test]
    fn fill_missing_replaces_only_empty_cells() {
        let options = IngestOptions {
            fill_missing: Some(0.0),
            zero_base: false,
            ..IngestOptions::default()
        };
        let series = read_csv_series(SAMPLE.as_bytes(), &options).unwrap();
        assert_eq!(series.time(), &[100.0, 101.0, 102.0]);
        assert_eq!(series.channel("Tailpipe NOX g/s").unwrap()[1], 0.0);
        assert!(series.channel("Power hp").unwrap()[2].is_nan());
    }

    #[test]
    fn missing_time_column_is_reported() {
        let options = IngestOptions {
            time_channel: "time_secs".into(),
            ..IngestOptions::default()
        };
        let err = read_csv_series(SAMPLE.as_bytes(), &options).unwrap_err();
        assert_eq!(err, WindowError::MissingChannel("time_secs".into()));
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        let text = "Time secs,a,a\n0,1,2\n";
        let err = read_csv_series(text.as_bytes(), &IngestOptions::default()).unwrap_err();
        assert_eq!(err, WindowError::DuplicateColumn("a".into()));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_csv_file(Path::new("does/not/exist.csv"), &IngestOptions::default())
            .unwrap_err();
        assert!(matches!(err, WindowError::Io(_)));
    }
}
