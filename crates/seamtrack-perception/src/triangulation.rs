//! Pixel → laser-plane triangulation.
//!
//! A pixel `(row, col)` on the sensor is back-projected through a calibrated
//! camera and intersected with the structured-light plane
//! `A·x + B·y + C·z + D = 0`.  The intersection can be reported in camera
//! coordinates ([`LaserTriangulator::point_3d`]) or in the local frame of the
//! laser plane ([`LaserTriangulator::point_2d`]), where the Y component is
//! zero by construction.
//!
//! # Example
//!
//! ```rust
//! use seamtrack_perception::triangulation::{CameraIntrinsics, LaserPlane, LaserTriangulator};
//!
//! let tri = LaserTriangulator::new(CameraIntrinsics::default(), LaserPlane::default()).unwrap();
//! let p = tri.point_2d(480.0, 640.0).unwrap();
//! assert!(p[1].abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use seamtrack_types::{SeamError, require_len};

use crate::matrix::Matrix;

/// Blend weight given to the new sample on the X and Y axes.
pub const XY_BLEND: f64 = 0.46;

/// Blend weight given to the new sample on the Z axis.
pub const Z_BLEND: f64 = 0.30;

/// Denominators below this magnitude mean the pixel ray misses the plane.
const RAY_PLANE_EPS: f64 = 1e-12;

/// Offset along Z used to pick the second basis point on the plane.
const FRAME_STEP: f64 = 100.0;

// ────────────────────────────────────────────────────────────────────────────
// Calibration
// ────────────────────────────────────────────────────────────────────────────

/// Camera model: focal length, radial correction `k`, pixel pitch and
/// principal point.  Lengths are in metres, the principal point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub k: f64,
    pub sx: f64,
    pub sy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            focal: 0.00849243,
            k: -1471.27,
            sx: 5.30046e-6,
            sy: 5.3e-6,
            cx: 632.341,
            cy: 473.814,
        }
    }
}

/// Laser plane `A·x + B·y + C·z + D = 0` in camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for LaserPlane {
    fn default() -> Self {
        Self {
            a: 31.2674,
            b: 0.709,
            c: -12.2524,
            d: 1.0,
        }
    }
}

impl LaserPlane {
    fn normal(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LaserTriangulator
// ────────────────────────────────────────────────────────────────────────────

/// Converts sensor pixels to points on the laser plane.
///
/// The plane frame and its inverse are computed once at construction; the
/// calibration is immutable afterwards.
#[derive(Debug, Clone)]
pub struct LaserTriangulator {
    camera: CameraIntrinsics,
    plane: LaserPlane,
    // Pixel-independent parts of the distortion polynomial.
    kt_terms: [f64; 6],
    world_to_plane: Matrix<f64>,
}

impl LaserTriangulator {
    /// Build a triangulator for the given calibration.
    ///
    /// # Errors
    ///
    /// [`SeamError::Degenerate`] when the plane normal is zero or its local
    /// frame cannot be inverted.
    pub fn new(camera: CameraIntrinsics, plane: LaserPlane) -> Result<Self, SeamError> {
        let CameraIntrinsics { k, sx, sy, cx, cy, .. } = camera;
        let kt_terms = [
            k * cx * cx * sx * sx,
            k * cx * sx * sx,
            k * cy * cy * sy * sy,
            2.0 * k * cy * sy * sy,
            k * sx * sx,
            k * sy * sy,
        ];

        let frame = plane_frame(&plane)?;
        let world_to_plane = frame
            .inverse()?
            .ok_or_else(|| SeamError::Degenerate("laser plane frame is singular".into()))?;

        debug!(a = plane.a, b = plane.b, c = plane.c, d = plane.d, "laser triangulator ready");
        Ok(Self {
            camera,
            plane,
            kt_terms,
            world_to_plane,
        })
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    pub fn plane(&self) -> &LaserPlane {
        &self.plane
    }

    /// Intersect the ray through pixel `(row, col)` with the laser plane.
    /// Result in millimetres, camera frame.
    ///
    /// # Errors
    ///
    /// [`SeamError::Degenerate`] when the ray is parallel to the plane.
    pub fn point_3d(&self, row: f64, col: f64) -> Result<[f64; 3], SeamError> {
        let CameraIntrinsics { focal, sx, sy, cx, cy, .. } = self.camera;
        let LaserPlane { a, b, c, d } = self.plane;
        let [p1, p2, p3, p4, p5, p6] = self.kt_terms;

        let kt = p1 - 2.0 * p2 * col + p3 - p4 * row + p5 * col * col + p6 * row * row + 1.0;
        let u = sx * col - cx * sx;
        let v = sy * row - cy * sy;

        let den = a * u + b * v + c * focal * kt;
        if den.abs() < RAY_PLANE_EPS {
            return Err(SeamError::Degenerate(format!(
                "pixel ({row}, {col}) ray does not intersect the laser plane"
            )));
        }

        Ok([
            -d * u / den * 1000.0,
            -d * v / den * 1000.0,
            -d * focal * kt / den * 1000.0,
        ])
    }

    /// Triangulate `(row, col)` and express the point in the laser-plane
    /// frame.  Result in millimetres; the Y component is ~0.
    pub fn point_2d(&self, row: f64, col: f64) -> Result<[f64; 3], SeamError> {
        let [x, y, z] = self.point_3d(row, col)?;
        let homogeneous = Matrix::from_array([[x / 1000.0], [y / 1000.0], [z / 1000.0], [1.0]]);
        let local = self.world_to_plane.try_mul(&homogeneous)?.into_vec();
        Ok([local[0] * 1000.0, local[1] * 1000.0, local[2] * 1000.0])
    }

    /// Plane-to-camera transform: columns are the plane's X/Y/Z axes and
    /// its origin.
    pub fn plane_frame(&self) -> Result<Matrix<f64>, SeamError> {
        plane_frame(&self.plane)
    }
}

fn plane_frame(plane: &LaserPlane) -> Result<Matrix<f64>, SeamError> {
    let normal = plane.normal();
    let n = dot(&normal, &normal);
    if n < RAY_PLANE_EPS {
        return Err(SeamError::Degenerate("laser plane normal is zero".into()));
    }

    // Two points on the plane: the foot of the origin and a point offset
    // along Z.
    let t0 = -plane.d / n;
    let t1 = -(FRAME_STEP * plane.c + plane.d) / n;
    let p0 = [plane.a * t0, plane.b * t0, plane.c * t0];
    let p1 = [plane.a * t1, plane.b * t1, plane.c * t1 + FRAME_STEP];

    let zb = normalize(&[p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]])?;
    let yb = normalize(&normal)?;
    let xb = cross(&yb, &zb);

    Ok(Matrix::from_array([
        [xb[0], yb[0], zb[0], p0[0]],
        [xb[1], yb[1], zb[1], p0[1]],
        [xb[2], yb[2], zb[2], p0[2]],
        [0.0, 0.0, 0.0, 1.0],
    ]))
}

// ────────────────────────────────────────────────────────────────────────────
// Point helpers
// ────────────────────────────────────────────────────────────────────────────

/// Blend a new point with the last accepted one to suppress jumps.
///
/// Returns `current` unchanged when `history` is empty, otherwise
/// `(1 - α)·last + α·current` with α = [`XY_BLEND`] on X/Y and [`Z_BLEND`]
/// on Z.
///
/// # Errors
///
/// [`SeamError::DimensionMismatch`] unless both points have 3 components.
pub fn continuity_filter(current: &[f64], history: &[Vec<f64>]) -> Result<[f64; 3], SeamError> {
    require_len("continuity filter point", current, 3)?;
    let cur = [current[0], current[1], current[2]];
    let Some(last) = history.last() else {
        return Ok(cur);
    };
    require_len("continuity filter history", last, 3)?;

    let blend = |alpha: f64, prev: f64, now: f64| (1.0 - alpha) * prev + alpha * now;
    Ok([
        blend(XY_BLEND, last[0], cur[0]),
        blend(XY_BLEND, last[1], cur[1]),
        blend(Z_BLEND, last[2], cur[2]),
    ])
}

/// Euclidean distance between two 3-D points.
pub fn distance(a: &[f64], b: &[f64]) -> Result<f64, SeamError> {
    require_len("distance", a, 3)?;
    require_len("distance", b, 3)?;
    Ok(a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt())
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: &[f64; 3]) -> Result<[f64; 3], SeamError> {
    let len = dot(v, v).sqrt();
    if len < RAY_PLANE_EPS {
        return Err(SeamError::Degenerate("cannot normalise a zero-length vector".into()));
    }
    Ok([v[0] / len, v[1] / len, v[2] / len])
}
