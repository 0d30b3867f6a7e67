//! Scalar Kalman smoothing of the measured seam position.
//!
//! Each axis is filtered independently with a random-walk model (identity
//! dynamics):
//!
//! ```text
//! P⁻ = P + q
//! K  = P⁻ / (P⁻ + r)
//! x  = x + K · (z − x)
//! P  = (1 − K) · P⁻
//! ```
//!
//! where `q` is the process noise and `r` the measurement noise.
//!
//! # Example
//!
//! ```rust
//! use seamtrack_planner::kalman::kalman_filter;
//!
//! let filtered = kalman_filter(&[1.0, 1.0, 1.0], 0.1, 0.01);
//! assert_eq!(filtered, vec![1.0, 1.0, 1.0]);
//! ```

/// Error variance assigned to the first sample.
pub const INITIAL_ERROR_VARIANCE: f64 = 10.0;

/// Filter a measurement sequence.  The estimate starts at the first sample;
/// the result has the same length as the input.
pub fn kalman_filter(measurements: &[f64], measurement_noise: f64, process_noise: f64) -> Vec<f64> {
    let Some(&first) = measurements.first() else {
        return Vec::new();
    };

    let mut estimate = first;
    let mut variance = INITIAL_ERROR_VARIANCE;
    let mut out = Vec::with_capacity(measurements.len());
    out.push(estimate);

    for &z in &measurements[1..] {
        variance += process_noise;
        let gain = variance / (variance + measurement_noise);
        estimate += gain * (z - estimate);
        variance *= 1.0 - gain;
        out.push(estimate);
    }
    out
}

/// Smoothed current position from a history of measured points.
///
/// Only the first three components of each row are used; shorter rows are
/// ignored.  Histories shorter than `warm_up` are left-padded with their
/// oldest sample so a fresh session starts from a settled estimate.
/// Returns `[0, 0, 0]` when there is nothing to filter.
pub fn filter_position(
    history: &[Vec<f64>],
    warm_up: usize,
    measurement_noise: f64,
    process_noise: f64,
) -> [f64; 3] {
    let rows: Vec<&Vec<f64>> = history.iter().filter(|row| row.len() >= 3).collect();
    let Some(oldest) = rows.first() else {
        return [0.0; 3];
    };
    let padding = warm_up.saturating_sub(rows.len());

    let mut out = [0.0; 3];
    for (axis, slot) in out.iter_mut().enumerate() {
        let series: Vec<f64> = std::iter::repeat_n(oldest[axis], padding)
            .chain(rows.iter().map(|row| row[axis]))
            .collect();
        *slot = kalman_filter(&series, measurement_noise, process_noise)
            .last()
            .copied()
            .unwrap_or_default();
    }
    out
}
