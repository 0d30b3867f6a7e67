//! Weld trajectory interpolation.
//!
//! Converts control points measured along the seam into fixed-point motion
//! increments sized for one controller interpolation cycle.  Each segment is
//! split into `N = floor(len / (weld_speed · inter_cycle))` identical steps;
//! segments too short for a single step are skipped.
//!
//! Increments are integers: position in 0.001 mm, attitude in 0.0001°.  The
//! Z position increment is always 0.
//!
//! # Example
//!
//! ```rust
//! use seamtrack_planner::interpolation::TrajectoryPlanner;
//!
//! let planner = TrajectoryPlanner::default();
//! let steps = planner
//!     .interpolate(&[0.0, 0.0, 0.0], &[1.5, 0.0, 0.0], 300.0, &[0.0, 0.0, 0.0])
//!     .unwrap();
//! assert_eq!(steps.len(), 10);
//! assert_eq!(steps[0][0], 150);
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use seamtrack_types::{Increment, SeamError, require_min_len};

use crate::kalman;

/// Fixed-point scale of position increments (0.001 mm).
pub const POSITION_SCALE: f64 = 1000.0;

/// Fixed-point scale of attitude increments (0.0001°).
pub const ATTITUDE_SCALE: f64 = 10000.0;

// Column offsets of the base-frame position in a saved tracking row.
const SAVED_POSITION: std::ops::Range<usize> = 5..8;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

fn default_weld_speed() -> f64 {
    15.0
}

fn default_inter_cycle() -> f64 {
    0.01
}

fn default_filter_delay() -> usize {
    180
}

fn default_measurement_noise() -> f64 {
    0.1
}

fn default_process_noise() -> f64 {
    0.01
}

/// Planner tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Nominal weld speed (mm/s).
    #[serde(default = "default_weld_speed")]
    pub weld_speed: f64,
    /// Controller interpolation cycle (s).
    #[serde(default = "default_inter_cycle")]
    pub inter_cycle: f64,
    /// Kalman warm-up length in samples.
    #[serde(default = "default_filter_delay")]
    pub filter_delay: usize,
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            weld_speed: default_weld_speed(),
            inter_cycle: default_inter_cycle(),
            filter_delay: default_filter_delay(),
            measurement_noise: default_measurement_noise(),
            process_noise: default_process_noise(),
        }
    }
}

impl PlannerConfig {
    /// Distance travelled in one interpolation cycle (mm).
    pub fn step_length(&self) -> f64 {
        self.weld_speed * self.inter_cycle
    }

    pub fn validate(&self) -> Result<(), SeamError> {
        if !(self.weld_speed > 0.0 && self.inter_cycle > 0.0) {
            return Err(SeamError::Config(format!(
                "weld_speed ({}) and inter_cycle ({}) must be positive",
                self.weld_speed, self.inter_cycle
            )));
        }
        if self.measurement_noise < 0.0 || self.process_noise < 0.0 {
            return Err(SeamError::Config("noise covariances must not be negative".into()));
        }
        Ok(())
    }
}

/// Attitude change and path length of a taught seam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeldParameters {
    /// Shortest signed rotation per axis from the first to the last point.
    pub inc_att: [f64; 3],
    /// Sum of the segment lengths over all taught points (mm).
    pub total_len: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// TrajectoryPlanner
// ────────────────────────────────────────────────────────────────────────────

/// Turns seam points into cycle-sized motion increments.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryPlanner {
    config: PlannerConfig,
}

impl TrajectoryPlanner {
    /// # Errors
    ///
    /// [`SeamError::Config`] when the configuration fails
    /// [`PlannerConfig::validate`].
    pub fn new(config: PlannerConfig) -> Result<Self, SeamError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Attitude delta and total length of the taught path.
    ///
    /// Returns `Ok(None)` for fewer than two points.
    ///
    /// # Errors
    ///
    /// [`SeamError::DimensionMismatch`] when the end points lack the three
    /// attitude components or any point lacks a position.
    pub fn weld_parameters(&self, taught: &[Vec<f64>]) -> Result<Option<WeldParameters>, SeamError> {
        let (Some(first), Some(last)) = (taught.first(), taught.last()) else {
            return Ok(None);
        };
        if taught.len() < 2 {
            return Ok(None);
        }
        require_min_len("taught start point", first, 6)?;
        require_min_len("taught end point", last, 6)?;

        let inc_att = [
            attitude_delta(first[3], last[3]),
            attitude_delta(first[4], last[4]),
            attitude_delta(first[5], last[5]),
        ];
        let mut total_len = 0.0;
        for pair in taught.windows(2) {
            total_len += segment_length(&pair[0], &pair[1])?;
        }

        debug!(?inc_att, total_len, points = taught.len(), "weld parameters");
        Ok(Some(WeldParameters { inc_att, total_len }))
    }

    /// Split the segment `p1 → p2` into identical cycle increments.
    ///
    /// The attitude change `total_inc_att` of the whole path is distributed
    /// in proportion to this segment's share of `total_len`.  Returns an
    /// empty vector when the segment is shorter than one step.
    ///
    /// # Errors
    ///
    /// - [`SeamError::InvalidArgument`] if `total_len <= 0` or the segment
    ///   is longer than `total_len`.
    /// - [`SeamError::DimensionMismatch`] if a point has fewer than 3
    ///   components or `total_inc_att` fewer than 3.
    pub fn interpolate(
        &self,
        p1: &[f64],
        p2: &[f64],
        total_len: f64,
        total_inc_att: &[f64],
    ) -> Result<Vec<Increment>, SeamError> {
        let len = segment_length(p1, p2)?;
        if total_len <= 0.0 {
            return Err(SeamError::InvalidArgument(format!(
                "total length must be positive, got {total_len}"
            )));
        }
        if len > total_len {
            return Err(SeamError::InvalidArgument(format!(
                "segment length {len} exceeds total length {total_len}"
            )));
        }
        require_min_len("total attitude increment", total_inc_att, 3)?;

        let n = self.step_count(len);
        if n == 0 {
            trace!(len, "segment shorter than one step");
            return Ok(Vec::new());
        }
        let steps = n as f64;

        let position = |axis: usize| ((p2[axis] - p1[axis]) / steps * POSITION_SCALE) as i32;
        let attitude =
            |axis: usize| (total_inc_att[axis] * len / (total_len * steps) * ATTITUDE_SCALE) as i32;

        let increment: Increment = [
            position(0),
            position(1),
            0,
            attitude(0),
            attitude(1),
            attitude(2),
        ];
        Ok(vec![increment; n])
    }

    /// Whether `p1 → p2` is long enough to yield at least one increment.
    pub fn needs_interpolation(&self, p1: &[f64], p2: &[f64]) -> Result<bool, SeamError> {
        Ok(self.step_count(segment_length(p1, p2)?) > 0)
    }

    /// Length of the base-frame path recorded in saved tracking rows, whose
    /// position sits at columns 5..8.  A single row has length 0.
    ///
    /// # Errors
    ///
    /// [`SeamError::DimensionMismatch`] when a row has fewer than 8
    /// components.
    pub fn measured_path_length(&self, rows: &[Vec<f64>]) -> Result<f64, SeamError> {
        if rows.len() < 2 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for pair in rows.windows(2) {
            require_min_len("saved tracking row", &pair[0], SAVED_POSITION.end)?;
            require_min_len("saved tracking row", &pair[1], SAVED_POSITION.end)?;
            total += segment_length(&pair[0][SAVED_POSITION], &pair[1][SAVED_POSITION])?;
        }
        Ok(total)
    }

    /// Interpolate every usable segment of `control` and consume it.
    ///
    /// Points closer than one step to the previously kept point are
    /// skipped.  When at least one segment was interpolated, every point
    /// except the last is removed from `control`; the last point becomes the
    /// start of the next batch.
    pub fn batch_increments(
        &self,
        control: &mut Vec<Vec<f64>>,
        total_len: f64,
        total_inc_att: &[f64],
    ) -> Result<Vec<Increment>, SeamError> {
        let mut out = Vec::new();
        let Some(first) = control.first() else {
            return Ok(out);
        };
        if control.len() < 2 {
            return Ok(out);
        }

        let mut kept: Vec<&[f64]> = vec![first.as_slice()];
        for point in &control[1..] {
            let last = kept[kept.len() - 1];
            if self.needs_interpolation(last, point)? {
                kept.push(point);
            }
        }
        if kept.len() < 2 {
            return Ok(out);
        }

        for pair in kept.windows(2) {
            out.extend(self.interpolate(pair[0], pair[1], total_len, total_inc_att)?);
        }
        debug!(
            control = control.len(),
            kept = kept.len(),
            increments = out.len(),
            "batch interpolated"
        );

        let consumed = control.len() - 1;
        control.drain(..consumed);
        Ok(out)
    }

    /// Kalman-smoothed current position from the measured history.
    pub fn filter_position(&self, history: &[Vec<f64>]) -> [f64; 3] {
        kalman::filter_position(
            history,
            self.config.filter_delay,
            self.config.measurement_noise,
            self.config.process_noise,
        )
    }

    fn step_count(&self, len: f64) -> usize {
        (len / self.config.step_length()) as usize
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Free helpers
// ────────────────────────────────────────────────────────────────────────────

/// Shortest signed rotation from `start` to `end`, in `(-180, 180]` degrees.
///
/// Multi-turn changes are folded: `attitude_delta(-170, 170)` is `-20`.
pub fn attitude_delta(start: f64, end: f64) -> f64 {
    let mut diff = (end - start) % 360.0;
    if diff < 0.0 {
        diff += 360.0;
    }
    if diff > 180.0 {
        diff -= 360.0;
    }
    diff
}

/// Euclidean distance between the positions (first three components) of
/// two points.
pub fn segment_length(a: &[f64], b: &[f64]) -> Result<f64, SeamError> {
    require_min_len("trajectory point", a, 3)?;
    require_min_len("trajectory point", b, 3)?;
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    Ok((dx * dx + dy * dy + dz * dz).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> TrajectoryPlanner {
        TrajectoryPlanner::default()
    }

    fn three_taught_points() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0],
            vec![4.0, 5.0, 6.0, 40.0, 50.0, 60.0],
            vec![7.0, 8.0, 9.0, 70.0, 80.0, 90.0],
        ]
    }

    #[test]
    fn attitude_delta_wraps_to_shortest_rotation() {
        assert!((attitude_delta(10.0, 20.0) - 10.0).abs() < 1e-9);
        assert!((attitude_delta(-10.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((attitude_delta(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((attitude_delta(-170.0, 170.0) + 20.0).abs() < 1e-9);
        assert_eq!(attitude_delta(30.0, 30.0), 0.0);
    }

    #[test]
    fn attitude_delta_stays_in_half_open_range() {
        for start in (-720..=720).step_by(37) {
            for end in (-720..=720).step_by(41) {
                let d = attitude_delta(start as f64, end as f64);
                assert!(d > -180.0 && d <= 180.0, "{start} -> {end} gave {d}");
            }
        }
        assert_eq!(attitude_delta(0.0, 180.0), 180.0);
        assert_eq!(attitude_delta(0.0, -180.0), 180.0);
    }

    #[test]
    fn segment_length_is_euclidean() {
        assert!((segment_length(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]).unwrap() - 5.0).abs() < 1e-9);
        let d = segment_length(&[-1.0, 2.0, 3.0], &[-4.0, 6.0, 9.0]).unwrap();
        assert!((d - 7.81025).abs() < 1e-5);
        assert!(segment_length(&[0.0, 0.0, 0.0], &[1.0]).is_err());
    }

    #[test]
    fn weld_parameters_for_three_points() {
        let params = planner().weld_parameters(&three_taught_points()).unwrap().unwrap();
        for inc in params.inc_att {
            assert!((inc - 60.0).abs() < 1e-9);
        }
        assert!((params.total_len - 2.0 * 27.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn weld_parameters_need_two_points() {
        assert_eq!(planner().weld_parameters(&[]).unwrap(), None);
        assert_eq!(planner().weld_parameters(&[vec![1.0, 2.0, 3.0]]).unwrap(), None);
        assert!(planner()
            .weld_parameters(&[vec![0.0; 3], vec![1.0; 3]])
            .is_err());
    }

    #[test]
    fn interpolate_long_segment() {
        let p1 = [0.0; 6];
        let p2 = [150.0, 0.0, 0.0, 90.0, 0.0, 0.0];
        let steps = planner().interpolate(&p1, &p2, 300.0, &[90.0, 0.0, 0.0]).unwrap();
        assert_eq!(steps.len(), 1000);
        assert_eq!(steps[0], [150, 0, 0, 450, 0, 0]);
        assert!(steps.iter().all(|s| *s == steps[0]));
    }

    #[test]
    fn interpolate_forces_zero_z() {
        let steps = planner()
            .interpolate(&[0.0, 0.0, 0.0], &[1.5, 0.0, 1.5], 300.0, &[0.0, 0.0, 0.0])
            .unwrap();
        assert!(!steps.is_empty());
        assert!(steps.iter().all(|s| s[2] == 0));
    }

    #[test]
    fn interpolate_suitable_segment() {
        let steps = planner()
            .interpolate(&[0.0; 6], &[1.5, 0.0, 0.0, 0.0, 0.0, 0.0], 300.0, &[0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(steps.len(), 10);
        assert_eq!(steps[0], [150, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn interpolate_rejects_bad_lengths() {
        let p1 = [0.0; 6];
        let p2 = [150.0, 0.0, 0.0, 90.0, 0.0, 0.0];
        let att = [90.0, 0.0, 0.0];
        assert!(matches!(
            planner().interpolate(&p1, &p2, 0.0, &att),
            Err(SeamError::InvalidArgument(_))
        ));
        assert!(matches!(
            planner().interpolate(&p1, &p2, 100.0, &att),
            Err(SeamError::InvalidArgument(_))
        ));
        assert!(planner().interpolate(&p1, &p2, 300.0, &[90.0]).is_err());
    }

    #[test]
    fn interpolate_short_segment_is_empty() {
        let steps = planner()
            .interpolate(&[0.0; 3], &[0.005, 0.0, 0.0], 100.0, &[90.0, 0.0, 0.0])
            .unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn needs_interpolation_threshold() {
        let p = planner();
        assert!(!p.needs_interpolation(&[0.0; 3], &[0.005, 0.0, 0.0]).unwrap());
        assert!(p.needs_interpolation(&[0.0; 3], &[0.3, 0.0, 0.0]).unwrap());
    }

    #[test]
    fn slower_speed_yields_more_steps() {
        let slow = TrajectoryPlanner::new(PlannerConfig {
            weld_speed: 7.5,
            ..PlannerConfig::default()
        })
        .unwrap();
        let steps = slow
            .interpolate(&[0.0; 3], &[1.5, 0.0, 0.0], 300.0, &[0.0; 3])
            .unwrap();
        assert_eq!(steps.len(), 20);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = PlannerConfig {
            inter_cycle: 0.0,
            ..PlannerConfig::default()
        };
        assert!(matches!(TrajectoryPlanner::new(bad), Err(SeamError::Config(_))));
    }

    #[test]
    fn measured_path_length_uses_saved_position_columns() {
        let rows = vec![
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0, 4.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 6.0, 8.0, 0.0],
        ];
        assert!((planner().measured_path_length(&rows).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(planner().measured_path_length(&rows[..1]).unwrap(), 0.0);
        assert!(planner()
            .measured_path_length(&[vec![0.0; 3], vec![0.0; 2]])
            .is_err());
    }

    #[test]
    fn batch_skips_close_points_and_keeps_last() {
        let mut control = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.05, 0.0, 0.0],
            vec![0.3, 0.0, 0.0],
            vec![0.6, 0.0, 0.0],
        ];
        let out = planner()
            .batch_increments(&mut control, 100.0, &[90.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(control, vec![vec![0.6, 0.0, 0.0]]);
    }

    #[test]
    fn batch_without_usable_segment_leaves_points() {
        let mut control = vec![vec![0.0, 0.0, 0.0], vec![0.01, 0.0, 0.0]];
        let out = planner()
            .batch_increments(&mut control, 100.0, &[0.0; 3])
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(control.len(), 2);

        let mut single = vec![vec![0.0, 0.0, 0.0]];
        assert!(planner().batch_increments(&mut single, 100.0, &[0.0; 3]).unwrap().is_empty());
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn batch_consumption_is_incremental() {
        let p = planner();
        let mut control = vec![vec![0.0, 0.0, 0.0], vec![1.5, 0.0, 0.0]];
        assert_eq!(p.batch_increments(&mut control, 100.0, &[0.0; 3]).unwrap().len(), 10);
        control.push(vec![3.0, 0.0, 0.0]);
        assert_eq!(p.batch_increments(&mut control, 100.0, &[0.0; 3]).unwrap().len(), 10);
        assert_eq!(control, vec![vec![3.0, 0.0, 0.0]]);
    }

    #[test]
    fn filter_position_uses_configured_warm_up() {
        let history = vec![vec![1.0, 2.0, 3.0]];
        assert_eq!(planner().filter_position(&history), [1.0, 2.0, 3.0]);
    }
}
