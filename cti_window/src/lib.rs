//! Work- and time-based window computation for emissions time series.
//!
//! Windows are sized by the integral of a weighting channel (elapsed time,
//! engine work, ...) rather than by sample count. The pipeline collapses large
//! time gaps, integrates channels against the squeezed time axis, scans for the
//! shortest contiguous ranges whose integrated weight reaches the target size,
//! and aggregates per-window totals and statistics into a [`WindowTable`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod config;
pub mod ingest;
pub mod integrate;
pub mod segment;
pub mod stats;
pub mod table;

pub use config::{WindowParams, WindowSpec};
pub use ingest::{read_csv_file, read_csv_series, IngestOptions};
pub use integrate::{cumulative_trapezoid, integrate_series, squeeze_time, IntegratedSeries};
pub use segment::{WindowBounds, WindowScan};
pub use stats::ChannelStats;
pub use table::{TableLayout, Window, WindowTable};

/// Reserved channel name for the constant `1.0` weight used by time-based windows.
pub const UNITY_CHANNEL: &str = "unity";

const TIME_LABEL: &str = "time";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("channel not present in series: {0}")]
    MissingChannel(String),
    #[error("duplicate output column: {0}")]
    DuplicateColumn(String),
    #[error("channel {channel} has {len} samples, expected {expected}")]
    LengthMismatch {
        channel: String,
        len: usize,
        expected: usize,
    },
    #[error("non-numeric {channel} value at sample {index}")]
    NonFinite { channel: String, index: usize },
    #[error("time decreases at sample {index}")]
    NonMonotonicTime { index: usize },
    #[error("invalid window configuration: {0}")]
    Config(String),
    #[error("failed to parse CSV: {0}")]
    Csv(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Broad failure class, used by batch drivers to decide skip-or-abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Data,
}

impl WindowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WindowError::InvalidParameter(_)
            | WindowError::MissingChannel(_)
            | WindowError::DuplicateColumn(_)
            | WindowError::Config(_) => ErrorKind::Config,
            WindowError::LengthMismatch { .. }
            | WindowError::NonFinite { .. }
            | WindowError::NonMonotonicTime { .. }
            | WindowError::Csv(_)
            | WindowError::Io(_) => ErrorKind::Data,
        }
    }
}

/// One row of an input series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub values: BTreeMap<String, f64>,
}

/// Column-oriented time series: one time axis plus named channels of equal length.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    time: Vec<f64>,
    channels: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            channels: BTreeMap::new(),
        }
    }

    /// Build a columnar series from rows. Channels absent from a row are NaN there.
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut channels: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sample in samples {
            for name in sample.values.keys() {
                channels
                    .entry(name.clone())
                    .or_insert_with(|| Vec::with_capacity(samples.len()));
            }
        }
        for (name, column) in channels.iter_mut() {
            column.extend(
                samples
                    .iter()
                    .map(|s| s.values.get(name).copied().unwrap_or(f64::NAN)),
            );
        }
        Self {
            time: samples.iter().map(|s| s.time).collect(),
            channels,
        }
    }

    pub fn with_channel(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, WindowError> {
        self.insert_channel(name, values)?;
        Ok(self)
    }

    /// Insert or replace a channel. Its length must match the time axis.
    pub fn insert_channel(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), WindowError> {
        let name = name.into();
        if values.len() != self.time.len() {
            return Err(WindowError::LengthMismatch {
                channel: name,
                len: values.len(),
                expected: self.time.len(),
            });
        }
        self.channels.insert(name, values);
        Ok(())
    }

    /// Add the constant [`UNITY_CHANNEL`], whose integral is elapsed squeezed time.
    pub fn with_unity_channel(mut self) -> Self {
        self.channels
            .insert(UNITY_CHANNEL.to_string(), vec![1.0; self.time.len()]);
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(|v| v.as_slice())
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(|k| k.as_str())
    }

    fn require(&self, name: &str) -> Result<&[f64], WindowError> {
        let values = self
            .channel(name)
            .ok_or_else(|| WindowError::MissingChannel(name.to_string()))?;
        if values.len() != self.time.len() {
            return Err(WindowError::LengthMismatch {
                channel: name.to_string(),
                len: values.len(),
                expected: self.time.len(),
            });
        }
        Ok(values)
    }
}

/// Compute the window table for `series` under `spec`.
///
/// Parameters, output column names and channel presence are checked before
/// any data is touched. A series with fewer than two samples yields an empty
/// table. The time axis must be finite and non-decreasing and the weight
/// channel finite; anything else is rejected as a data error.
pub fn find_windows(series: &TimeSeries, spec: &WindowSpec) -> Result<WindowTable, WindowError> {
    spec.validate()?;
    let layout = TableLayout::new(&spec.integrate_channels, &spec.statistic_channels)?;

    let weight = series.require(&spec.weight_channel)?;
    let integrate = spec
        .integrate_channels
        .iter()
        .map(|name| series.require(name))
        .collect::<Result<Vec<_>, _>>()?;
    let statistics = spec
        .statistic_channels
        .iter()
        .map(|name| series.require(name))
        .collect::<Result<Vec<_>, _>>()?;

    if series.len() < 2 {
        debug!(samples = series.len(), "too few samples to form a window");
        return Ok(WindowTable::new(layout));
    }

    check_time_axis(series.time())?;
    check_finite(&spec.weight_channel, weight)?;

    let params = &spec.params;
    let integrated = integrate_series(series.time(), params.max_dt, weight, &integrate);
    let scan = WindowScan::new(
        integrated.squeezed_time.view(),
        integrated.integrated_window.view(),
        params.window_size,
        params.window_step,
    );

    let mut table = WindowTable::new(layout);
    for bounds in scan {
        table.push(Window::aggregate(&integrated, &statistics, bounds));
    }

    debug!(
        samples = series.len(),
        windows = table.len(),
        trailing_partial = table.windows().last().map_or(false, |w| w.partial),
        "window scan complete"
    );
    Ok(table)
}

fn check_time_axis(time: &[f64]) -> Result<(), WindowError> {
    check_finite(TIME_LABEL, time)?;
    match time.windows(2).position(|w| w[1] < w[0]) {
        Some(pos) => Err(WindowError::NonMonotonicTime { index: pos + 1 }),
        None => Ok(()),
    }
}

fn check_finite(channel: &str, values: &[f64]) -> Result<(), WindowError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(WindowError::NonFinite {
            channel: channel.to_string(),
            index,
        }),
        None => Ok(()),
    }
}
