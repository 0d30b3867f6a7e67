//! Seam tracking supervisor.
//!
//! Ties the pixel-to-base chain, the trajectory planner and a robot link
//! together for one tracking session:
//!
//! 1. [`SeamTracker::begin`] takes the taught path and fixes the weld
//!    parameters.
//! 2. [`SeamTracker::on_measurement`] turns each sensor pixel into a
//!    smoothed base-frame control point, using the live flange pose.
//! 3. [`SeamTracker::dispatch`] interpolates the accumulated control points
//!    and hands the increments to the link while the controller has room.

use tracing::{debug, info};

use seamtrack_hal::MotionLink;
use seamtrack_perception::LaserToBase;
use seamtrack_perception::triangulation::continuity_filter;
use seamtrack_planner::{TrajectoryPlanner, WeldParameters};
use seamtrack_types::SeamError;

use crate::config::TrackerConfig;

/// History kept for smoothing, as a multiple of the Kalman warm-up length.
const HISTORY_WINDOW_FACTOR: usize = 2;

/// One tracking session over a [`MotionLink`].
pub struct SeamTracker<L: MotionLink> {
    chain: LaserToBase,
    planner: TrajectoryPlanner,
    link: L,
    weld: Option<WeldParameters>,
    history: Vec<Vec<f64>>,
    control: Vec<Vec<f64>>,
}

impl<L: MotionLink> SeamTracker<L> {
    pub fn new(chain: LaserToBase, planner: TrajectoryPlanner, link: L) -> Self {
        Self {
            chain,
            planner,
            link,
            weld: None,
            history: Vec::new(),
            control: Vec::new(),
        }
    }

    /// Build the chain and planner from `cfg`.
    pub fn from_config(cfg: &TrackerConfig, link: L) -> Result<Self, SeamError> {
        Ok(Self::new(cfg.laser_to_base()?, cfg.planner()?, link))
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn planner(&self) -> &TrajectoryPlanner {
        &self.planner
    }

    pub fn weld_parameters(&self) -> Option<&WeldParameters> {
        self.weld.as_ref()
    }

    /// Most recent continuity-filtered points, bounded by the smoothing
    /// window.
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    /// Smoothed points not yet consumed by [`dispatch`](Self::dispatch).
    pub fn control_points(&self) -> &[Vec<f64>] {
        &self.control
    }

    /// Start a session on the taught path `[x, y, z, rx, ry, rz]…`.
    ///
    /// Clears any previous session; the taught start position becomes the
    /// first control point.
    ///
    /// # Errors
    ///
    /// [`SeamError::InvalidArgument`] for fewer than two taught points;
    /// dimension errors from the weld parameter computation.
    pub fn begin(&mut self, taught: &[Vec<f64>]) -> Result<WeldParameters, SeamError> {
        let params = self.planner.weld_parameters(taught)?.ok_or_else(|| {
            SeamError::InvalidArgument(format!(
                "taught path needs at least two points, got {}",
                taught.len()
            ))
        })?;
        let start = taught.first().map(|p| p[..3].to_vec()).unwrap_or_default();
        self.begin_with(params, start);
        Ok(params)
    }

    /// Start a session with precomputed weld parameters from `start`.
    pub fn begin_with(&mut self, params: WeldParameters, start: Vec<f64>) {
        self.weld = Some(params);
        self.history.clear();
        self.control.clear();
        self.control.push(start);
        info!(total_len = params.total_len, inc_att = ?params.inc_att, "tracking session started");
    }

    /// Convert the laser point seen at `(row, col)` into a control point.
    ///
    /// Returns `Ok(None)` while the link has not yet received a robot
    /// status, since the flange pose is unknown.
    pub fn on_measurement(&mut self, row: f64, col: f64) -> Result<Option<[f64; 3]>, SeamError> {
        let status = self.link.robot_status();
        if status.updated_at.is_none() {
            debug!(row, col, "no robot status yet; measurement dropped");
            return Ok(None);
        }
        let base = self.chain.measure_to_base(row, col, &status.flange_pose())?;
        self.on_point(base).map(Some)
    }

    /// Feed a base-frame point: continuity filter against the history,
    /// Kalman smoothing, then append to the control points.
    pub fn on_point(&mut self, base: [f64; 3]) -> Result<[f64; 3], SeamError> {
        let accepted = continuity_filter(&base, &self.history)?;
        self.history.push(accepted.to_vec());
        let window = self.history_window();
        if self.history.len() > window {
            let excess = self.history.len() - window;
            self.history.drain(..excess);
        }
        let smoothed = self.planner.filter_position(&self.history);
        self.control.push(smoothed.to_vec());
        Ok(smoothed)
    }

    fn history_window(&self) -> usize {
        HISTORY_WINDOW_FACTOR * self.planner.config().filter_delay.max(1)
    }

    /// Interpolate pending control points and queue the increments.
    ///
    /// Returns the number of increments queued; 0 while the controller's
    /// queue is full or no segment is long enough yet.
    ///
    /// # Errors
    ///
    /// [`SeamError::InvalidArgument`] before [`begin`](Self::begin), or when
    /// a control segment is longer than the taught path.
    pub fn dispatch(&mut self) -> Result<usize, SeamError> {
        let Some(weld) = self.weld else {
            return Err(SeamError::InvalidArgument("tracking session not started".into()));
        };
        if !self.link.has_room() {
            debug!(pending = self.control.len(), "controller queue full; dispatch deferred");
            return Ok(0);
        }

        let increments = self
            .planner
            .batch_increments(&mut self.control, weld.total_len, &weld.inc_att)?;
        if increments.is_empty() {
            return Ok(0);
        }
        let frames = self.link.queue_increments(&increments);
        info!(increments = increments.len(), frames, "batch dispatched");
        Ok(increments.len())
    }
}
