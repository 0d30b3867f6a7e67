//! Laser plane → robot base frame chain.
//!
//! A laser-plane point is first mapped into the flange frame by the fixed
//! hand-eye calibration, then into the robot base frame by the live flange
//! pose reported by the controller.

use serde::{Deserialize, Serialize};

use seamtrack_types::{SeamError, require_len};

use crate::matrix::Matrix;
use crate::triangulation::LaserTriangulator;

/// Default laser → flange calibration: six rotation entries followed by the
/// translation in millimetres.
pub const DEFAULT_LASER_TO_FLANGE: [f64; 9] = [
    0.0899, -0.7703, 0.9834, 0.0267, 0.0701, 0.5472, 46.9476, -1.9444, 351.2831,
];

/// Hand-eye calibration of the sensor relative to the robot flange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandEyeCalibration {
    /// `[r00, r02, r10, r12, r20, r22, tx, ty, tz]`.  The middle rotation
    /// column is zero because laser points have no Y extent.
    pub laser_to_flange: [f64; 9],
    /// Residual error added to every base-frame point (mm).
    pub correction: [f64; 3],
}

impl Default for HandEyeCalibration {
    fn default() -> Self {
        Self {
            laser_to_flange: DEFAULT_LASER_TO_FLANGE,
            correction: [0.0; 3],
        }
    }
}

/// Homogeneous laser → flange transform from the 9 calibration values.
pub fn laser_to_flange_transform(params: &[f64; 9]) -> Matrix<f64> {
    let [r00, r02, r10, r12, r20, r22, tx, ty, tz] = *params;
    Matrix::from_array([
        [r00, 0.0, r02, tx],
        [r10, 0.0, r12, ty],
        [r20, 0.0, r22, tz],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Homogeneous flange → base transform for `pose = [x, y, z, rx, ry, rz]`
/// (mm, degrees).  Rotation is `Rz · Ry · Rx`.
///
/// # Errors
///
/// [`SeamError::DimensionMismatch`] unless `pose` has exactly 6 components.
pub fn flange_to_base_transform(pose: &[f64]) -> Result<Matrix<f64>, SeamError> {
    require_len("flange pose", pose, 6)?;
    let (sa, ca) = pose[5].to_radians().sin_cos();
    let (sb, cb) = pose[4].to_radians().sin_cos();
    let (sc, cc) = pose[3].to_radians().sin_cos();

    Ok(Matrix::from_array([
        [ca * cb, ca * sb * sc - sa * cc, ca * sb * cc + sa * sc, pose[0]],
        [sa * cb, sa * sb * sc + ca * cc, sa * sb * cc - ca * sc, pose[1]],
        [-sb, cb * sc, cb * cc, pose[2]],
        [0.0, 0.0, 0.0, 1.0],
    ]))
}

/// Maps sensor pixels straight into the robot base frame.
#[derive(Debug, Clone)]
pub struct LaserToBase {
    triangulator: LaserTriangulator,
    laser_to_flange: Matrix<f64>,
    correction: [f64; 3],
}

impl LaserToBase {
    pub fn new(triangulator: LaserTriangulator, calibration: &HandEyeCalibration) -> Self {
        Self {
            triangulator,
            laser_to_flange: laser_to_flange_transform(&calibration.laser_to_flange),
            correction: calibration.correction,
        }
    }

    pub fn triangulator(&self) -> &LaserTriangulator {
        &self.triangulator
    }

    pub fn laser_to_flange(&self) -> &Matrix<f64> {
        &self.laser_to_flange
    }

    /// Base-frame position (mm) of the laser point seen at `(row, col)`
    /// while the flange is at `flange_pose`.
    ///
    /// # Errors
    ///
    /// Propagates triangulation failures; [`SeamError::DimensionMismatch`]
    /// unless `flange_pose` has exactly 6 components.
    pub fn measure_to_base(
        &self,
        row: f64,
        col: f64,
        flange_pose: &[f64],
    ) -> Result<[f64; 3], SeamError> {
        let flange_to_base = flange_to_base_transform(flange_pose)?;
        let [x, _, z] = self.triangulator.point_2d(row, col)?;
        // The point lies on the laser plane, so Y is 0.
        let local = Matrix::from_array([[x], [0.0], [z], [1.0]]);

        let in_flange = self.laser_to_flange.try_mul(&local)?;
        let in_base = flange_to_base.try_mul(&in_flange)?.into_vec();

        Ok([
            in_base[0] + self.correction[0],
            in_base[1] + self.correction[1],
            in_base[2] + self.correction[2],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangulation::{CameraIntrinsics, LaserPlane};

    fn default_chain() -> LaserToBase {
        let tri = LaserTriangulator::new(CameraIntrinsics::default(), LaserPlane::default()).unwrap();
        LaserToBase::new(tri, &HandEyeCalibration::default())
    }

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn laser_transform_has_zero_middle_column() {
        let m = laser_to_flange_transform(&DEFAULT_LASER_TO_FLANGE);
        for r in 0..4 {
            assert_eq!(m.get(r, 1).unwrap(), 0.0);
        }
        assert_eq!(m.get(0, 0).unwrap(), 0.0899);
        assert_eq!(m.get(0, 2).unwrap(), -0.7703);
        assert_eq!(m.get(2, 3).unwrap(), 351.2831);
        assert_eq!(m.row_text(3, ",").unwrap(), "0.000000,0.000000,0.000000,1.000000");
    }

    #[test]
    fn identity_pose_gives_identity_rotation() {
        let m = flange_to_base_transform(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let expected = [
            1.0, 0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, 2.0, //
            0.0, 0.0, 1.0, 3.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert_close(m.as_slice(), &expected, 1e-12);
    }

    #[test]
    fn yaw_of_ninety_degrees_rotates_x_onto_y() {
        let m = flange_to_base_transform(&[0.0, 0.0, 0.0, 0.0, 0.0, 90.0]).unwrap();
        let p = m.try_mul(&Matrix::from_array([[1.0], [0.0], [0.0], [1.0]])).unwrap();
        assert_close(p.as_slice(), &[0.0, 1.0, 0.0, 1.0], 1e-12);
    }

    #[test]
    fn flange_rotation_is_orthonormal() {
        let m = flange_to_base_transform(&[0.0, 0.0, 0.0, 12.0, -33.0, 71.0]).unwrap();
        let mut r = Matrix::new(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                r.set(i, j, m.get(i, j).unwrap()).unwrap();
            }
        }
        let product = r.transpose().try_mul(&r).unwrap();
        assert_close(product.as_slice(), Matrix::<f64>::identity(3).as_slice(), 1e-12);
        assert!((r.det_gauss().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flange_pose_must_have_six_components() {
        assert!(flange_to_base_transform(&[0.0; 5]).is_err());
        assert!(default_chain().measure_to_base(0.0, 0.0, &[0.0; 7]).is_err());
    }

    #[test]
    fn measure_to_base_with_translated_flange() {
        let p = default_chain()
            .measure_to_base(0.0, 0.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        assert_close(&p, &[58.431804, -7.422574, 368.428026], 1e-3);
    }

    #[test]
    fn measure_to_base_with_yawed_flange() {
        let p = default_chain()
            .measure_to_base(0.0, 0.0, &[100.0, 0.0, 0.0, 0.0, 0.0, 90.0])
            .unwrap();
        assert_close(&p, &[89.601527, 24.069508, 369.103468], 1e-3);
    }

    #[test]
    fn correction_is_added_per_axis() {
        let tri = LaserTriangulator::new(CameraIntrinsics::default(), LaserPlane::default()).unwrap();
        let calibration = HandEyeCalibration {
            correction: [1.0, -2.0, 0.5],
            ..HandEyeCalibration::default()
        };
        let corrected = LaserToBase::new(tri, &calibration);
        let pose = [0.0; 6];
        let base = default_chain().measure_to_base(0.0, 0.0, &pose).unwrap();
        let shifted = corrected.measure_to_base(0.0, 0.0, &pose).unwrap();
        assert_close(&shifted, &[base[0] + 1.0, base[1] - 2.0, base[2] + 0.5], 1e-12);
    }
}
