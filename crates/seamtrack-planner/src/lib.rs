//! `seamtrack-planner` – weld path planning.
//!
//! # Modules
//!
//! - [`interpolation`] – [`TrajectoryPlanner`][interpolation::TrajectoryPlanner]:
//!   weld parameters from taught points, segment interpolation into
//!   fixed-point increments, incremental batch consumption of control
//!   points.
//! - [`kalman`] – scalar Kalman filter and the padded per-axis position
//!   filter.

pub mod interpolation;
pub mod kalman;

pub use interpolation::{PlannerConfig, TrajectoryPlanner, WeldParameters, attitude_delta, segment_length};
