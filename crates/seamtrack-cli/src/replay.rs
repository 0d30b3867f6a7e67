//! Offline replay of a recorded seam through the tracking pipeline.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use seamtrack_hal::MotionLink;
use seamtrack_runtime::{SeamTracker, TrackerConfig};
use seamtrack_types::{INCREMENT_BATCH, Increment, RobotStatus, SeamError};

/// Link stand-in that records increments instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunLink {
    queued: Mutex<Vec<Increment>>,
    frames: AtomicUsize,
}

impl DryRunLink {
    pub fn increments(&self) -> Vec<Increment> {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }
}

impl MotionLink for DryRunLink {
    fn robot_status(&self) -> RobotStatus {
        RobotStatus::default()
    }

    fn has_room(&self) -> bool {
        true
    }

    fn queue_increments(&self, increments: &[Increment]) -> usize {
        let frames = increments.len().div_ceil(INCREMENT_BATCH);
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(increments);
        self.frames.fetch_add(frames, Ordering::Relaxed);
        frames
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub points: usize,
    pub increments: Vec<Increment>,
    pub frames: usize,
    pub total_len: f64,
    /// Kalman-smoothed control point for every input point.
    pub smoothed: Vec<[f64; 3]>,
}

/// Treat `points` as both the taught path (with fixed attitude) and the
/// measured seam, dispatching after every point.
pub fn replay(cfg: &TrackerConfig, points: &[[f64; 3]]) -> Result<ReplaySummary, SeamError> {
    let taught: Vec<Vec<f64>> = points
        .iter()
        .map(|p| vec![p[0], p[1], p[2], 0.0, 0.0, 0.0])
        .collect();

    let mut tracker = SeamTracker::from_config(cfg, DryRunLink::default())?;
    let params = tracker.begin(&taught)?;

    let mut smoothed = Vec::with_capacity(points.len());
    for point in points {
        smoothed.push(tracker.on_point(*point)?);
        tracker.dispatch()?;
    }

    Ok(ReplaySummary {
        points: points.len(),
        increments: tracker.link().increments(),
        frames: tracker.link().frames(),
        total_len: params.total_len,
        smoothed,
    })
}
