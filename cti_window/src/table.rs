//! Per-window aggregation and the ordered window table.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::integrate::IntegratedSeries;
use crate::segment::WindowBounds;
use crate::stats::{ChannelStats, STAT_SUFFIXES};
use crate::WindowError;

pub const FIXED_COLUMNS: [&str; 4] = ["start_time", "end_time", "duration", "window_size"];

/// Suffix marking a per-second rate channel, e.g. `Tailpipe NOX g/s`.
pub const RATE_SUFFIX: &str = "/s";
/// Appended to integrated channels that are not rates, e.g. `Power hp-sec`.
pub const ACCUMULATED_SUFFIX: &str = "-sec";

/// Output column for an integrated channel: a rate loses its `/s`, anything
/// else gains `-sec`.
pub fn integrated_column_name(channel: &str) -> String {
    match channel.strip_suffix(RATE_SUFFIX) {
        Some(quantity) => quantity.to_string(),
        None => format!("{channel}{ACCUMULATED_SUFFIX}"),
    }
}

pub fn statistic_column_names(channel: &str) -> [String; 4] {
    STAT_SUFFIXES.map(|suffix| format!("{channel} {suffix}"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct IntegratedColumn {
    channel: String,
    column: String,
}

/// Output column names for one window table; guaranteed free of duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    integrated: Vec<IntegratedColumn>,
    statistics: Vec<String>,
}

impl TableLayout {
    pub fn new(integrate: &[String], statistics: &[String]) -> Result<Self, WindowError> {
        let integrated: Vec<IntegratedColumn> = integrate
            .iter()
            .map(|channel| IntegratedColumn {
                channel: channel.clone(),
                column: integrated_column_name(channel),
            })
            .collect();
        let layout = Self {
            integrated,
            statistics: statistics.to_vec(),
        };

        let mut seen = BTreeSet::new();
        for column in layout.columns() {
            if column.trim().is_empty() {
                return Err(WindowError::InvalidParameter(
                    "output column name would be empty".into(),
                ));
            }
            if !seen.insert(column.clone()) {
                return Err(WindowError::DuplicateColumn(column));
            }
        }
        Ok(layout)
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.integrated.iter().map(|c| c.column.clone()));
        for channel in &self.statistics {
            columns.extend(statistic_column_names(channel));
        }
        columns
    }

    /// Source channel of an integrated output column.
    pub fn source_channel(&self, column: &str) -> Option<&str> {
        self.integrated
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.channel.as_str())
    }

    /// Integrated output column of a source channel.
    pub fn integrated_column(&self, channel: &str) -> Option<&str> {
        self.integrated
            .iter()
            .find(|c| c.channel == channel)
            .map(|c| c.column.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// Achieved integral of the clipped weight channel.
    pub window_size: f64,
    pub partial: bool,
    pub totals: Vec<f64>,
    pub stats: Vec<ChannelStats>,
}

impl Window {
    /// Totals come from the cumulative integrals, statistics from the raw
    /// statistic channels over `[start_idx, end_idx]` inclusive.
    pub fn aggregate(
        integrated: &IntegratedSeries,
        statistics: &[&[f64]],
        bounds: WindowBounds,
    ) -> Self {
        let WindowBounds {
            start_idx: start,
            end_idx: end,
            partial,
        } = bounds;
        let time = &integrated.squeezed_time;
        let progress = &integrated.integrated_window;
        Self {
            start_idx: start,
            end_idx: end,
            start_time: time[start],
            end_time: time[end],
            duration: time[end] - time[start],
            window_size: progress[end] - progress[start],
            partial,
            totals: integrated
                .integrated_data
                .iter()
                .map(|data| data[end] - data[start])
                .collect(),
            stats: statistics
                .iter()
                .map(|values| ChannelStats::from_values(&values[start..=end]))
                .collect(),
        }
    }

    /// Value of the `idx`-th column in [`TableLayout::columns`] order.
    pub fn value(&self, idx: usize) -> Option<f64> {
        let fixed = [self.start_time, self.end_time, self.duration, self.window_size];
        if idx < fixed.len() {
            return Some(fixed[idx]);
        }
        let idx = idx - fixed.len();
        if idx < self.totals.len() {
            return Some(self.totals[idx]);
        }
        let idx = idx - self.totals.len();
        self.stats
            .get(idx / STAT_SUFFIXES.len())
            .map(|s| s.values()[idx % STAT_SUFFIXES.len()])
    }

    pub fn row(&self) -> Vec<f64> {
        let mut row = vec![self.start_time, self.end_time, self.duration, self.window_size];
        row.extend(&self.totals);
        for stats in &self.stats {
            row.extend(stats.values());
        }
        row
    }
}

/// Windows in discovery order (earliest start first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowTable {
    layout: TableLayout,
    windows: Vec<Window>,
}

impl WindowTable {
    pub fn new(layout: TableLayout) -> Self {
        Self {
            layout,
            windows: Vec::new(),
        }
    }

    pub fn push(&mut self, window: Window) {
        self.windows.push(window);
    }

    /// Keep only windows matching `keep`; order is preserved.
    pub fn retain<F: FnMut(&Window) -> bool>(&mut self, keep: F) {
        self.windows.retain(keep);
    }

    pub fn columns(&self) -> Vec<String> {
        self.layout.columns()
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn partial_count(&self) -> usize {
        self.windows.iter().filter(|w| w.partial).count()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        self.windows.iter().map(Window::row)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.layout.columns().iter().position(|c| c == name)?;
        self.windows.iter().map(|w| w.value(idx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate::integrate_series;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rate_channels_drop_suffix_others_accumulate() {
        assert_eq!(integrated_column_name("Tailpipe NOX g/s"), "Tailpipe NOX g");
        assert_eq!(integrated_column_name("Power hp"), "Power hp-sec");
        assert_eq!(integrated_column_name("m/s/s"), "m/s");
    }

    #[test]
    fn layout_round_trips_channels() {
        let layout = TableLayout::new(
            &names(&["Power hp", "Tailpipe CO2 g/s"]),
            &names(&["Vehicle Speed MPH"]),
        )
        .unwrap();
        assert_eq!(layout.source_channel("Tailpipe CO2 g"), Some("Tailpipe CO2 g/s"));
        assert_eq!(layout.source_channel("Power hp-sec"), Some("Power hp"));
        assert_eq!(layout.integrated_column("Power hp"), Some("Power hp-sec"));
        assert_eq!(layout.source_channel("Power hp"), None);
        assert_eq!(layout.columns().len(), 4 + 2 + 4);
        assert_eq!(layout.columns()[9], "Vehicle Speed MPH SD");
    }

    #[test]
    fn colliding_columns_are_rejected() {
        let err = TableLayout::new(&names(&["NOX g/s", "NOX g-sec/s", "NOX g"]), &[]).unwrap_err();
        assert_eq!(err, WindowError::DuplicateColumn("NOX g-sec".into()));

        let err = TableLayout::new(&names(&["duration/s"]), &[]).unwrap_err();
        assert_eq!(err, WindowError::DuplicateColumn("duration".into()));

        let err = TableLayout::new(&[], &names(&["speed", "speed"])).unwrap_err();
        assert_eq!(err, WindowError::DuplicateColumn("speed MIN".into()));

        assert!(matches!(
            TableLayout::new(&names(&["/s"]), &[]),
            Err(WindowError::InvalidParameter(_))
        ));
    }

    #[test]
    fn aggregate_single_sample_window() {
        let time = [0.0, 1.0, 2.0];
        let weight = [0.0, 0.0, 0.0];
        let speed = [3.0, 4.0, 5.0];
        let integrated = integrate_series(&time, 1.0, &weight, &[&speed]);
        let window = Window::aggregate(
            &integrated,
            &[&speed],
            WindowBounds {
                start_idx: 2,
                end_idx: 2,
                partial: true,
            },
        );
        assert_eq!(window.duration, 0.0);
        assert_eq!(window.window_size, 0.0);
        assert_eq!(window.totals, vec![0.0]);
        assert_eq!(window.stats[0].mean, 5.0);
        assert!(window.stats[0].sd.is_nan());
    }

    #[test]
    fn rows_and_columns_line_up() {
        let layout = TableLayout::new(&names(&["NOX g/s"]), &names(&["speed"])).unwrap();
        let mut table = WindowTable::new(layout);
        table.push(Window {
            start_idx: 0,
            end_idx: 2,
            start_time: 0.0,
            end_time: 2.0,
            duration: 2.0,
            window_size: 2.0,
            partial: false,
            totals: vec![0.5],
            stats: vec![ChannelStats::from_values(&[5.0, 7.0, 9.0])],
        });
        let row = table.rows().next().unwrap();
        assert_eq!(row.len(), table.columns().len());
        assert_eq!(table.column("NOX g"), Some(vec![0.5]));
        assert_eq!(table.column("speed SD"), Some(vec![2.0]));
        assert_eq!(table.column("speed"), None);

        table.retain(|w| w.duration >= 5.0);
        assert!(table.is_empty());
    }
}
