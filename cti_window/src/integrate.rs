use ndarray::{Array1, ArrayView1};

/// Cumulative integrals of the weight and integrate channels over squeezed time.
#[derive(Clone, Debug)]
pub struct IntegratedSeries {
    pub squeezed_time: Array1<f64>,
    /// Integral of the weight channel clipped at zero; non-decreasing.
    pub integrated_window: Array1<f64>,
    /// Signed integrals, one per integrate channel, in request order.
    pub integrated_data: Vec<Array1<f64>>,
}

/// Cap every inter-sample step at `max_dt` and re-accumulate.
///
/// The step before the first sample is `time[0] - 0`, so a series that does
/// not start at zero keeps a (capped) offset.
pub fn squeeze_time(time: &[f64], max_dt: f64) -> Array1<f64> {
    let mut squeezed = Vec::with_capacity(time.len());
    let mut previous = 0.0;
    let mut total = 0.0;
    for &t in time {
        total += (t - previous).min(max_dt);
        squeezed.push(total);
        previous = t;
    }
    Array1::from_vec(squeezed)
}

/// Number of inter-sample steps (after the first sample) longer than `max_dt`.
pub fn collapsed_gaps(time: &[f64], max_dt: f64) -> usize {
    time.windows(2).filter(|w| w[1] - w[0] > max_dt).count()
}

/// Trapezoidal running integral of `y` over `x`, starting at 0.
pub fn cumulative_trapezoid(y: ArrayView1<f64>, x: ArrayView1<f64>) -> Array1<f64> {
    let n = y.len().min(x.len());
    let mut out = Array1::<f64>::zeros(n);
    for i in 1..n {
        out[i] = out[i - 1] + 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    out
}

pub fn integrate_series(
    time: &[f64],
    max_dt: f64,
    weight: &[f64],
    integrate: &[&[f64]],
) -> IntegratedSeries {
    let squeezed_time = squeeze_time(time, max_dt);
    let clipped: Array1<f64> = weight.iter().map(|&v| v.max(0.0)).collect();
    let integrated_window = cumulative_trapezoid(clipped.view(), squeezed_time.view());
    let integrated_data = integrate
        .iter()
        .map(|values| cumulative_trapezoid(ArrayView1::from(*values), squeezed_time.view()))
        .collect();
    IntegratedSeries {
        squeezed_time,
        integrated_window,
        integrated_data,
    }
}
