//! `seamtrack-perception` – sensor geometry.
//!
//! Turns a pixel on the laser-triangulation sensor into a point in the
//! robot's base frame.
//!
//! # Modules
//!
//! - [`matrix`] – [`Matrix`][matrix::Matrix]: dense row-major matrix with
//!   Gauss-Jordan inversion and Gaussian-elimination determinant.
//! - [`triangulation`] – [`LaserTriangulator`][triangulation::LaserTriangulator]:
//!   ray / laser-plane intersection, plane-local coordinates, continuity
//!   filter.
//! - [`hand_eye`] – [`LaserToBase`][hand_eye::LaserToBase]: laser → flange →
//!   base frame chain driven by the live flange pose.

pub mod hand_eye;
pub mod matrix;
pub mod triangulation;

pub use hand_eye::{HandEyeCalibration, LaserToBase};
pub use matrix::Matrix;
pub use triangulation::{CameraIntrinsics, LaserPlane, LaserTriangulator};
