use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Output column suffixes, in the order [`ChannelStats::values`] returns them.
pub const STAT_SUFFIXES: [&str; 4] = ["MIN", "MAX", "AVG", "SD"];

/// Min, max, mean and sample standard deviation of one channel over a window.
///
/// NaN samples are skipped. `sd` uses the `n - 1` divisor and is NaN when
/// fewer than two values are present; every field is NaN when none are.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sd: f64,
}

impl ChannelStats {
    pub fn from_values(values: &[f64]) -> Self {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return Self::undefined();
        }
        let n = present.len() as f64;
        let min = present.iter().copied().map(OrderedFloat).min();
        let max = present.iter().copied().map(OrderedFloat).max();
        let mean = present.iter().sum::<f64>() / n;
        let sd = if present.len() > 1 {
            let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        } else {
            f64::NAN
        };
        Self {
            min: min.map_or(f64::NAN, |v| v.0),
            max: max.map_or(f64::NAN, |v| v.0),
            mean,
            sd,
        }
    }

    pub fn undefined() -> Self {
        Self {
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            sd: f64::NAN,
        }
    }

    pub fn values(&self) -> [f64; 4] {
        [self.min, self.max, self.mean, self.sd]
    }
}
