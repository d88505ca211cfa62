//! Device orientation from gravity and geomagnetic vectors.
//!
//! Builds the world frame (East, North, Up) in device coordinates from one
//! accelerometer reading and one magnetometer reading, the same convention
//! Android's `SensorManager.getRotationMatrix` / `getOrientation` use.
//! Angles are radians.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Below 10% of standard gravity the device is treated as in free fall
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Minimum |magnetic × gravity| before the East axis is considered undefined
const MIN_EAST_NORM: f32 = 0.1;

/// Rotation matrix R (device → world) and inclination matrix I (world → geomagnetic)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMatrices {
    pub r: Matrix3<f32>,
    pub i: Matrix3<f32>,
}

/// Azimuth, pitch and roll in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation about -Z, in [-π, π]; 0 when the device's Y axis points at magnetic north
    pub azimuth: f32,
    /// Rotation about X, in [-π/2, π/2]
    pub pitch: f32,
    /// Rotation about Y, in [-π, π]
    pub roll: f32,
}

impl Orientation {
    pub fn to_array(self) -> [f32; 3] {
        [self.azimuth, self.pitch, self.roll]
    }
}

/// Compute R and I from a gravity (or raw accelerometer) vector and a magnetic field vector.
///
/// Returns `None` when the device is close to free fall or when gravity and
/// the magnetic field are (nearly) collinear; in both cases the horizontal
/// axes cannot be built.
pub fn rotation_matrix(
    gravity: &Vector3<f32>,
    geomagnetic: &Vector3<f32>,
) -> Option<RotationMatrices> {
    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(gravity);
    let east_norm = east.norm();
    if east_norm < MIN_EAST_NORM {
        return None;
    }

    let east = east / east_norm;
    let up = gravity.normalize();
    let north = up.cross(&east);

    let r = Matrix3::from_rows(&[east.transpose(), north.transpose(), up.transpose()]);

    // Field strength is at least MIN_EAST_NORM / |gravity| here, never zero
    let inv_e = 1.0 / geomagnetic.norm();
    let c = geomagnetic.dot(&north) * inv_e;
    let s = geomagnetic.dot(&up) * inv_e;
    #[rustfmt::skip]
    let i = Matrix3::new(
        1.0, 0.0, 0.0,
        0.0,   c,   s,
        0.0,  -s,   c,
    );

    Some(RotationMatrices { r, i })
}

/// Azimuth, pitch and roll encoded by a rotation matrix
pub fn orientation(r: &Matrix3<f32>) -> Orientation {
    // Row-major indices: R[1] = (0,1), R[4] = (1,1), R[6] = (2,0), R[7] = (2,1), R[8] = (2,2)
    Orientation {
        azimuth: r[(0, 1)].atan2(r[(1, 1)]),
        pitch: (-r[(2, 1)]).clamp(-1.0, 1.0).asin(),
        roll: (-r[(2, 0)]).atan2(r[(2, 2)]),
    }
}

/// Magnetic dip angle from the inclination matrix
pub fn inclination(i: &Matrix3<f32>) -> f32 {
    i[(1, 2)].atan2(i[(1, 1)])
}

/// Full pipeline used on each magnetic-field sample
pub fn estimate_orientation(
    gravity: &Vector3<f32>,
    geomagnetic: &Vector3<f32>,
) -> Option<Orientation> {
    rotation_matrix(gravity, geomagnetic).map(|m| orientation(&m.r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn assert_orthonormal(r: &Matrix3<f32>) {
        let product = r * r.transpose();
        for row in 0..3 {
            for col in 0..3 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(product[(row, col)], expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_flat_facing_north() {
        let gravity = Vector3::new(0.0, 0.0, 9.8);
        let magnetic = Vector3::new(0.0, 1.0, 0.0);

        let m = rotation_matrix(&gravity, &magnetic).unwrap();
        assert_abs_diff_eq!(m.r, Matrix3::identity(), epsilon = 1e-6);

        let o = orientation(&m.r);
        assert_abs_diff_eq!(o.azimuth, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(o.pitch, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(o.roll, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_flat_facing_east() {
        // Device Y axis points east, so north lies along -X
        let gravity = Vector3::new(0.0, 0.0, 9.8);
        let magnetic = Vector3::new(-30.0, 0.0, -40.0);

        let o = estimate_orientation(&gravity, &magnetic).unwrap();
        assert_abs_diff_eq!(o.azimuth, FRAC_PI_2, epsilon = 1e-5);
        assert_abs_diff_eq!(o.pitch, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(o.roll, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_upright_portrait_pitch() {
        // Phone standing on its bottom edge: gravity along +Y
        let gravity = Vector3::new(0.0, 9.8, 0.0);
        let magnetic = Vector3::new(0.0, -20.0, -40.0);

        let o = estimate_orientation(&gravity, &magnetic).unwrap();
        assert_abs_diff_eq!(o.pitch, -FRAC_PI_2, epsilon = 1e-3);
    }

    #[test]
    fn test_face_down_roll() {
        let gravity = Vector3::new(0.0, 0.0, -9.8);
        let magnetic = Vector3::new(0.0, 22.0, 40.0);

        let o = estimate_orientation(&gravity, &magnetic).unwrap();
        assert_abs_diff_eq!(o.roll.abs(), PI, epsilon = 1e-5);
    }

    #[test]
    fn test_free_fall_rejected() {
        let gravity = Vector3::new(0.0, 0.0, 0.5);
        let magnetic = Vector3::new(0.0, 22.0, -40.0);
        assert!(rotation_matrix(&gravity, &magnetic).is_none());
        assert!(rotation_matrix(&Vector3::zeros(), &magnetic).is_none());
    }

    #[test]
    fn test_collinear_rejected() {
        let gravity = Vector3::new(0.0, 0.0, 9.8);
        assert!(rotation_matrix(&gravity, &Vector3::new(0.0, 0.0, 45.0)).is_none());
        assert!(rotation_matrix(&gravity, &Vector3::new(0.0, 0.0, -45.0)).is_none());
        assert!(rotation_matrix(&gravity, &Vector3::zeros()).is_none());
    }

    #[test]
    fn test_rows_orthonormal_for_tilted_inputs() {
        let cases = [
            (Vector3::new(1.2, -3.4, 8.9), Vector3::new(12.0, 25.0, -38.0)),
            (Vector3::new(-6.1, 0.4, 7.5), Vector3::new(-4.0, 31.0, 17.0)),
            (Vector3::new(0.3, 9.7, 0.8), Vector3::new(40.0, -3.0, 9.0)),
        ];

        for (gravity, magnetic) in cases {
            let m = rotation_matrix(&gravity, &magnetic).unwrap();
            assert_orthonormal(&m.r);
            assert_orthonormal(&m.i);
            assert_abs_diff_eq!(m.r.determinant(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_angle_ranges() {
        let gravity = Vector3::new(-4.0, -5.0, -6.5);
        let magnetic = Vector3::new(-20.0, 14.0, 33.0);

        let o = estimate_orientation(&gravity, &magnetic).unwrap();
        assert!((-PI..=PI).contains(&o.azimuth));
        assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&o.pitch));
        assert!((-PI..=PI).contains(&o.roll));
    }

    #[test]
    fn test_inclination_dip() {
        // Field points 45° below the horizon towards north
        let gravity = Vector3::new(0.0, 0.0, 9.8);
        let magnetic = Vector3::new(0.0, 30.0, -30.0);

        let m = rotation_matrix(&gravity, &magnetic).unwrap();
        assert_abs_diff_eq!(inclination(&m.i), -PI / 4.0, epsilon = 1e-5);
    }
}
