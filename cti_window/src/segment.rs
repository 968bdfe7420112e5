//! Window boundary search.
//!
//! [`WindowScan`] walks the squeezed time axis with two cursors. The start
//! cursor jumps to the first sample at or after the previous window start plus
//! `window_step`; the end cursor only ever moves forward until the weight
//! integral since the start reaches `window_size`. Because the end cursor never
//! rewinds, a full scan is O(n) regardless of how many windows overlap.

use std::iter::FusedIterator;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Inclusive sample range of one accepted window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start_idx: usize,
    pub end_idx: usize,
    /// The series ended before the target size was reached.
    pub partial: bool,
}

#[derive(Clone, Debug)]
pub struct WindowScan<'a> {
    time: ArrayView1<'a, f64>,
    progress: ArrayView1<'a, f64>,
    window_size: f64,
    window_step: f64,
    start_idx: usize,
    end_idx: usize,
    anchor: f64,
    emitted: bool,
    finished: bool,
}

impl<'a> WindowScan<'a> {
    /// `time` must be non-decreasing and `progress` (the clipped weight
    /// integral) non-decreasing and of the same length. `window_size` and
    /// `window_step` must be positive; callers validate them first.
    pub fn new(
        time: ArrayView1<'a, f64>,
        progress: ArrayView1<'a, f64>,
        window_size: f64,
        window_step: f64,
    ) -> Self {
        Self {
            time,
            progress,
            window_size,
            window_step,
            start_idx: 0,
            end_idx: 0,
            anchor: f64::NEG_INFINITY,
            emitted: false,
            finished: time.len() != progress.len(),
        }
    }
}

impl<'a> Iterator for WindowScan<'a> {
    type Item = WindowBounds;

    fn next(&mut self) -> Option<WindowBounds> {
        if self.finished {
            return None;
        }
        let last = match self.time.len().checked_sub(1) {
            Some(last) => last,
            None => {
                self.finished = true;
                return None;
            }
        };
        if !(self.start_idx <= self.end_idx && self.end_idx < last) {
            self.finished = true;
            return None;
        }

        let mut start = search_sorted_left(self.time, self.anchor + self.window_step);
        if self.emitted {
            // A step below the float resolution of the anchor rounds back onto it.
            start = start.max(self.start_idx + 1);
        }
        if start > last {
            self.finished = true;
            return None;
        }

        let target = self.progress[start] + self.window_size;
        while self.end_idx < last && self.progress[self.end_idx] < target {
            self.end_idx += 1;
        }
        let end = self.end_idx;
        let reached = self.progress[end] >= target;
        if !reached && end != last {
            // Only reachable with NaN progress; stop rather than spin.
            self.finished = true;
            return None;
        }

        self.start_idx = start;
        self.anchor = self.time[start];
        self.emitted = true;
        trace!(
            start_idx = start,
            end_idx = end,
            start_progress = self.progress[start],
            end_progress = self.progress[end],
            size = self.progress[end] - self.progress[start],
            "window accepted"
        );
        Some(WindowBounds {
            start_idx: start,
            end_idx: end,
            partial: !reached,
        })
    }
}

impl<'a> FusedIterator for WindowScan<'a> {}

/// Collect every window boundary for the given axes.
pub fn segment_windows<'a>(
    time: ArrayView1<'a, f64>,
    progress: ArrayView1<'a, f64>,
    window_size: f64,
    window_step: f64,
) -> Vec<WindowBounds> {
    WindowScan::new(time, progress, window_size, window_step).collect()
}

/// First index `i` with `sorted[i] >= target`, or `sorted.len()` if none.
fn search_sorted_left(sorted: ArrayView1<f64>, target: f64) -> usize {
    let (mut lo, mut hi) = (0usize, sorted.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if sorted[mid] < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate::integrate_series;
    use ndarray::Array1;

    fn scan(time: &[f64], progress: &[f64], size: f64, step: f64) -> Vec<WindowBounds> {
        segment_windows(
            ArrayView1::from(time),
            ArrayView1::from(progress),
            size,
            step,
        )
    }

    fn bounds(start_idx: usize, end_idx: usize, partial: bool) -> WindowBounds {
        WindowBounds {
            start_idx,
            end_idx,
            partial,
        }
    }

    #[test]
    fn unit_weight_example_emits_trailing_partial() {
        let axis = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let windows = scan(&axis, &axis, 2.0, 2.0);
        assert_eq!(
            windows,
            vec![bounds(0, 2, false), bounds(2, 4, false), bounds(4, 5, true)]
        );
    }

    #[test]
    fn target_reached_on_last_sample_is_not_partial() {
        let axis = [0.0, 1.0, 2.0, 3.0, 4.0];
        let windows = scan(&axis, &axis, 2.0, 2.0);
        assert_eq!(windows, vec![bounds(0, 2, false), bounds(2, 4, false)]);
    }

    #[test]
    fn search_is_left_biased() {
        let axis = Array1::from_vec(vec![0.0, 1.0, 1.0, 2.0]);
        assert_eq!(search_sorted_left(axis.view(), f64::NEG_INFINITY), 0);
        assert_eq!(search_sorted_left(axis.view(), 1.0), 1);
        assert_eq!(search_sorted_left(axis.view(), 1.5), 3);
        assert_eq!(search_sorted_left(axis.view(), 9.0), 4);
    }

    #[test]
    fn short_axes_produce_nothing() {
        assert!(scan(&[], &[], 1.0, 1.0).is_empty());
        assert!(scan(&[0.0], &[0.0], 1.0, 1.0).is_empty());
    }

    #[test]
    fn step_past_the_end_stops_the_scan() {
        let axis = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let windows = scan(&axis, &axis, 2.0, 100.0);
        assert_eq!(windows, vec![bounds(0, 2, false)]);
    }

    #[test]
    fn step_below_sample_spacing_overlaps_and_stays_bounded() {
        let time: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let windows = scan(&time, &time, 3.0, 0.25);
        assert!(windows.len() <= time.len());
        assert_eq!(windows[0], bounds(0, 3, false));
        assert_eq!(windows[1], bounds(1, 4, false));
        for pair in windows.windows(2) {
            assert!(pair[1].start_idx > pair[0].start_idx);
            assert!(pair[1].end_idx >= pair[0].end_idx);
        }
        // Starts advance one sample at a time until the end cursor hits the last sample.
        assert_eq!(windows.len(), 7);
        assert_eq!(*windows.last().unwrap(), bounds(6, 9, false));
    }

    #[test]
    fn step_below_float_resolution_still_advances() {
        let mut time = vec![0.0];
        time.extend((0..20).map(|i| 1e6 + i as f64));
        let windows: Vec<WindowBounds> = WindowScan::new(
            ArrayView1::from(&time[..]),
            ArrayView1::from(&time[..]),
            1.5,
            1e-12,
        )
        .take(1000)
        .collect();
        assert!(windows.len() <= time.len());
        for pair in windows.windows(2) {
            assert!(pair[1].start_idx > pair[0].start_idx);
        }
        assert_eq!(windows[0], bounds(0, 1, false));
        assert_eq!(windows[1], bounds(1, 3, false));
        assert_eq!(windows[2], bounds(2, 4, false));
        assert_eq!(windows.len(), 19);
        assert_eq!(*windows.last().unwrap(), bounds(18, 20, false));
    }

    #[test]
    fn end_cursor_never_regresses_and_size_floor_holds() {
        let time: Vec<f64> = (0..200).map(|i| i as f64 * 0.5).collect();
        let power: Vec<f64> = (0..200)
            .map(|i| ((i as f64) * 0.37).sin() * 40.0 + 15.0)
            .collect();
        let integrated = integrate_series(&time, 1.0, &power, &[]);
        let windows = segment_windows(
            integrated.squeezed_time.view(),
            integrated.integrated_window.view(),
            25.0,
            3.0,
        );
        assert!(windows.len() > 3);
        for pair in windows.windows(2) {
            assert!(pair[1].end_idx >= pair[0].end_idx);
        }
        let progress = &integrated.integrated_window;
        for w in &windows[..windows.len() - 1] {
            assert!(!w.partial);
            assert!(progress[w.end_idx] - progress[w.start_idx] >= 25.0);
        }
    }

    #[test]
    fn flat_weight_yields_single_partial_window() {
        let time = [0.0, 1.0, 2.0, 3.0];
        let progress = [0.0, 0.0, 0.0, 0.0];
        let windows = scan(&time, &progress, 1.0, 1.0);
        assert_eq!(windows, vec![bounds(0, 3, true)]);
    }

    #[test]
    fn tiling_windows_account_for_total_weight() {
        let time: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let windows = scan(&time, &time, 10.0, 10.0);
        let full: f64 = windows
            .iter()
            .filter(|w| !w.partial)
            .map(|w| time[w.end_idx] - time[w.start_idx])
            .sum();
        assert_eq!(windows.len(), 10);
        assert!((full - 100.0).abs() < 1e-9);

        let time: Vec<f64> = (0..=95).map(|i| i as f64).collect();
        let windows = scan(&time, &time, 10.0, 10.0);
        let full: f64 = windows
            .iter()
            .filter(|w| !w.partial)
            .map(|w| time[w.end_idx] - time[w.start_idx])
            .sum();
        let last = windows.last().unwrap();
        assert!(last.partial);
        assert!((95.0 - full - (time[last.end_idx] - time[last.start_idx])).abs() < 1e-9);
    }
}
