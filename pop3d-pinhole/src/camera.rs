use crate::{BrownConrady, CameraIntrinsics};
use pop3d_core::{
    nalgebra::{Matrix2x3, Matrix3, Matrix3x4, Point2, Point3, Vector2},
    CameraToCamera, CameraToWorld, ImageFeatures, Pose, Result, SpaceFeatures, WorldToCamera,
};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Newton tolerance used when mapping distorted pixels back onto the ideal image plane.
const UNDISTORT_EPSILON: f64 = 1e-12;
const UNDISTORT_MAX_ITERATIONS: usize = 20;

/// One fully calibrated camera of the rig.
///
/// The pose maps camera space into world space, so its translation is the optical center
/// of the camera. Calibration that stores the opposite direction is read with
/// [`CalibratedCamera::from_world_to_camera`]. A camera is plain data and stays fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CalibratedCamera {
    pub intrinsics: CameraIntrinsics,
    pub distortion: BrownConrady,
    pub pose: CameraToWorld,
}

impl CalibratedCamera {
    pub fn new(intrinsics: CameraIntrinsics, distortion: BrownConrady, pose: CameraToWorld) -> Self {
        Self {
            intrinsics,
            distortion,
            pose,
        }
    }

    /// Builds a camera from the raw calibration values: an intrinsic matrix, 4 or 5 distortion
    /// coefficients and the camera-to-world pose.
    pub fn from_calibration(
        intrinsic_matrix: &Matrix3<f64>,
        distortion: &[f64],
        pose: CameraToWorld,
    ) -> Result<Self> {
        Ok(Self::new(
            CameraIntrinsics::from_matrix(intrinsic_matrix)?,
            BrownConrady::from_coefficients(distortion)?,
            pose,
        ))
    }

    /// Same as [`CalibratedCamera::from_calibration`] for extrinsics that map world points into the camera.
    pub fn from_world_to_camera(
        intrinsic_matrix: &Matrix3<f64>,
        distortion: &[f64],
        pose: WorldToCamera,
    ) -> Result<Self> {
        Self::from_calibration(intrinsic_matrix, distortion, pose.inverse())
    }

    pub fn world_to_camera(&self) -> WorldToCamera {
        self.pose.inverse()
    }

    /// The pose of `other` in the space of this camera.
    ///
    /// Rotation is `R_selfᵗ·R_other` and translation is `R_selfᵗ·(t_other - t_self)`.
    pub fn extrinsic_to(&self, other: &CalibratedCamera) -> CameraToCamera {
        self.pose.relative_to(other.pose)
    }

    /// The linear projection matrix `K·[R|t]` of world points, ignoring distortion.
    pub fn projection_matrix(&self) -> Matrix3x4<f64> {
        self.intrinsics.matrix() * self.world_to_camera().matrix3x4()
    }

    /// Projects a point given in the space of this camera.
    ///
    /// Points on or behind the image plane have no projection.
    pub fn project_camera_point(&self, point: Point3<f64>) -> Option<Point2<f64>> {
        if point.z <= 0.0 || !point.z.is_finite() {
            return None;
        }
        let normalized = point.xy().coords / point.z;
        Some(self.intrinsics.uncalibrate(self.distortion.distort(normalized)))
    }

    /// Projects a world point into distorted pixel coordinates.
    pub fn project(&self, point: Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(self.pose.inverse_transform(point))
    }

    /// Projects a world point and returns the Jacobian of the pixel with respect to the world point.
    pub fn project_with_jacobian(&self, point: Point3<f64>) -> Option<(Point2<f64>, Matrix2x3<f64>)> {
        let camera_point = self.pose.inverse_transform(point);
        let pixel = self.project_camera_point(camera_point)?;
        let (x, y, z) = (camera_point.x, camera_point.y, camera_point.z);
        let normalized = Vector2::new(x / z, y / z);

        // d(x/z, y/z) / d(camera point)
        let z2 = z * z;
        #[rustfmt::skip]
        let perspective = Matrix2x3::new(
            1.0 / z, 0.0,     -x / z2,
            0.0,     1.0 / z, -y / z2,
        );
        let rotation = self.pose.rotation().inverse().into_inner();
        let jacobian = self.intrinsics.jacobian()
            * self.distortion.jacobian(normalized)
            * perspective
            * rotation;
        Some((pixel, jacobian))
    }

    /// Removes lens distortion from an observed pixel, keeping pixel units.
    pub fn undistort_pixel(&self, pixel: Point2<f64>) -> Point2<f64> {
        self.intrinsics.uncalibrate(self.undistort_normalized(pixel))
    }

    /// Maps an observed pixel onto the ideal image plane at depth one.
    pub fn undistort_normalized(&self, pixel: Point2<f64>) -> Vector2<f64> {
        self.distortion.undistort(
            self.intrinsics.calibrate(pixel),
            UNDISTORT_EPSILON,
            UNDISTORT_MAX_ITERATIONS,
        )
    }

    /// Projects every world point of a frame. Points without a projection are left out.
    pub fn project_features(&self, points: &SpaceFeatures) -> ImageFeatures {
        points
            .iter()
            .filter_map(|(name, &p)| Some((name.clone(), self.project(p)?)))
            .collect()
    }
}
