//! Pinhole cameras with Brown-Conrady lens distortion.
//!
//! A [`CalibratedCamera`] bundles the intrinsic matrix, the distortion coefficients and the pose
//! of one camera of the rig. It converts world points into pixels, which is all the triangulator
//! and the bundle adjuster need from a camera, and maps observed pixels back onto the ideal
//! (undistorted) image plane.

mod camera;
mod distortion;

pub use camera::*;
pub use distortion::*;

use pop3d_core::{
    nalgebra::{Matrix2, Matrix3, Point2, Vector2},
    Error, Result,
};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
///
/// Distortion is handled separately by [`BrownConrady`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Creates camera intrinsics that would create an identity intrinsic matrix.
    /// This would imply that the pixel positions have an origin at `0,0`,
    /// the pixel distance unit is the focal length, pixels are square,
    /// and there is no skew.
    pub fn identity() -> Self {
        Self {
            focals: Vector2::new(1.0, 1.0),
            skew: 0.0,
            principal_point: Point2::new(0.0, 0.0),
        }
    }

    #[must_use]
    pub fn focals(self, focals: Vector2<f64>) -> Self {
        Self { focals, ..self }
    }

    #[must_use]
    pub fn focal(self, focal: f64) -> Self {
        Self {
            focals: Vector2::new(focal, focal),
            ..self
        }
    }

    #[must_use]
    pub fn principal_point(self, principal_point: Point2<f64>) -> Self {
        Self {
            principal_point,
            ..self
        }
    }

    #[must_use]
    pub fn skew(self, skew: f64) -> Self {
        Self { skew, ..self }
    }

    /// Reads an upper triangular intrinsic matrix as stored by calibration tools.
    ///
    /// The matrix is scaled so that its bottom right entry is one.
    pub fn from_matrix(matrix: &Matrix3<f64>) -> Result<Self> {
        let scale = matrix[(2, 2)];
        let lower = [matrix[(1, 0)], matrix[(2, 0)], matrix[(2, 1)]];
        if scale == 0.0 || !scale.is_finite() || lower.iter().any(|&n| n != 0.0) {
            return Err(Error::SingularIntrinsics);
        }
        let matrix = matrix / scale;
        let intrinsics = Self {
            focals: Vector2::new(matrix[(0, 0)], matrix[(1, 1)]),
            principal_point: Point2::new(matrix[(0, 2)], matrix[(1, 2)]),
            skew: matrix[(0, 1)],
        };
        if intrinsics.focals.iter().any(|&f| f == 0.0 || !f.is_finite()) {
            return Err(Error::SingularIntrinsics);
        }
        Ok(intrinsics)
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focals.x,  self.skew,      self.principal_point.x,
            0.0,            self.focals.y,  self.principal_point.y,
            0.0,            0.0,            1.0,
        )
    }

    /// The linear part of [`CameraIntrinsics::uncalibrate`].
    #[rustfmt::skip]
    pub fn jacobian(&self) -> Matrix2<f64> {
        Matrix2::new(
            self.focals.x,  self.skew,
            0.0,            self.focals.y,
        )
    }

    /// Converts a pixel into normalized image coordinates.
    ///
    /// ```
    /// use pop3d_pinhole::CameraIntrinsics;
    /// use pop3d_core::nalgebra::{Point2, Vector2};
    /// let intrinsics = CameraIntrinsics {
    ///     focals: Vector2::new(800.0, 900.0),
    ///     principal_point: Point2::new(500.0, 600.0),
    ///     skew: 1.7,
    /// };
    /// let pixel = Point2::new(471.0, 322.0);
    /// let normalized = intrinsics.calibrate(pixel);
    /// let distance = (pixel.to_homogeneous() - intrinsics.matrix() * normalized.push(1.0)).norm();
    /// assert!(distance < 1e-9);
    /// ```
    pub fn calibrate(&self, pixel: Point2<f64>) -> Vector2<f64> {
        let centered = pixel - self.principal_point;
        let y = centered.y / self.focals.y;
        let x = (centered.x - self.skew * y) / self.focals.x;
        Vector2::new(x, y)
    }

    /// Converts normalized image coordinates back into a pixel.
    pub fn uncalibrate(&self, normalized: Vector2<f64>) -> Point2<f64> {
        let y = normalized.y * self.focals.y;
        let x = normalized.x * self.focals.x + self.skew * normalized.y;
        Point2::new(x, y) + self.principal_point.coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matrix_round_trip() {
        let intrinsics = CameraIntrinsics::identity()
            .focals(Vector2::new(1510.2, 1507.9))
            .principal_point(Point2::new(1920.0 / 2.0, 1080.0 / 2.0));
        let back = CameraIntrinsics::from_matrix(&(intrinsics.matrix() * 2.0)).unwrap();
        assert_relative_eq!(back.matrix(), intrinsics.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn rejects_singular_matrix() {
        assert_eq!(
            CameraIntrinsics::from_matrix(&Matrix3::zeros()),
            Err(Error::SingularIntrinsics)
        );
        let mut matrix = CameraIntrinsics::identity().matrix();
        matrix[(2, 0)] = 0.5;
        assert_eq!(
            CameraIntrinsics::from_matrix(&matrix),
            Err(Error::SingularIntrinsics)
        );
    }

    #[test]
    fn calibrate_round_trip() {
        let intrinsics = CameraIntrinsics::identity()
            .focal(1200.0)
            .principal_point(Point2::new(640.0, 360.0))
            .skew(0.5);
        let pixel = Point2::new(17.0, 913.0);
        assert_relative_eq!(
            intrinsics.uncalibrate(intrinsics.calibrate(pixel)),
            pixel,
            epsilon = 1e-9
        );
    }
}
