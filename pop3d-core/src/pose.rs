use crate::{Result, RotationRepresentation};
use derive_more::{AsMut, AsRef, From, Into};
use nalgebra::{IsometryMatrix3, Matrix3, Matrix3x4, Point3, Rotation3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented by all the different poses in this library:
///
/// * [`RigidTransform`] - Transforms points between two unnamed spaces
/// * [`WorldToCamera`] - Transforms world points into camera points
/// * [`CameraToWorld`] - Transforms camera points into world points
/// * [`CameraToCamera`] - Transforms points from the space of one camera into another
/// * [`ObjectToWorld`] - Transforms points on a tracked object into world points
///
/// Forward application is `R·p + t` and the inverse is `Rᵗ·(p - t)`.
pub trait Pose: From<IsometryMatrix3<f64>> + Clone + Copy {
    type Inverse: Pose;

    /// Retrieve the isometry.
    fn isometry(self) -> IsometryMatrix3<f64>;

    /// Creates a pose with no change in position or orientation.
    fn identity() -> Self {
        IsometryMatrix3::identity().into()
    }

    /// Takes the inverse of the pose.
    fn inverse(self) -> Self::Inverse {
        self.isometry().inverse().into()
    }

    /// Create the pose from rotation and translation.
    fn from_parts(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        IsometryMatrix3::from_parts(translation.into(), rotation).into()
    }

    /// Create the pose from a tagged rotation and a translation.
    fn from_representation(rotation: &RotationRepresentation, translation: Vector3<f64>) -> Result<Self> {
        Ok(Self::from_parts(translation, rotation.to_rotation()?))
    }

    /// The rotation component.
    fn rotation(self) -> Rotation3<f64> {
        self.isometry().rotation
    }

    /// The translation component.
    fn translation(self) -> Vector3<f64> {
        self.isometry().translation.vector
    }

    /// Retrieve the `[R|t]` matrix.
    fn matrix3x4(self) -> Matrix3x4<f64> {
        let isometry = self.isometry();
        let rot = isometry.rotation.matrix();
        let trans = isometry.translation.vector;
        Matrix3x4::<f64>::from_columns(&[rot.column(0), rot.column(1), rot.column(2), trans.column(0)])
    }

    /// Applies `R·p + t`.
    fn transform(self, point: Point3<f64>) -> Point3<f64> {
        self.isometry() * point
    }

    /// Applies `Rᵗ·(p - t)`.
    fn inverse_transform(self, point: Point3<f64>) -> Point3<f64> {
        self.isometry().inverse_transform_point(&point)
    }
}

macro_rules! pose_type {
    ($(#[$attr:meta])* $name:ident, $inverse:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
        #[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
        pub struct $name(pub IsometryMatrix3<f64>);

        impl Pose for $name {
            type Inverse = $inverse;

            #[inline(always)]
            fn isometry(self) -> IsometryMatrix3<f64> {
                self.into()
            }
        }
    };
}

pose_type!(
    /// A rotation and translation between two spaces that carry no further meaning.
    RigidTransform,
    RigidTransform
);

pose_type!(
    /// This maps world points into the space of a camera, where the positive z axis
    /// points forwards out of the optical center.
    WorldToCamera,
    CameraToWorld
);

pose_type!(
    /// This contains a camera pose, which is a pose of the camera relative to the world.
    /// Its translation is the optical center of the camera in world coordinates.
    CameraToWorld,
    WorldToCamera
);

pose_type!(
    /// A relative pose that transforms the points of camera `A` into the space of camera `B`.
    CameraToCamera,
    CameraToCamera
);

pose_type!(
    /// The pose of a tracked object, mapping its marker template into world space.
    ObjectToWorld,
    RigidTransform
);

impl CameraToWorld {
    /// The pose of camera `other` expressed in the space of `self`.
    ///
    /// Rotation is `R_selfᵗ·R_other` and translation is `R_selfᵗ·(t_other - t_self)`.
    pub fn relative_to(self, other: CameraToWorld) -> CameraToCamera {
        CameraToCamera(self.0.inverse() * other.0)
    }
}

impl RigidTransform {
    /// Chains `self` after `first`, so the result applies `first` and then `self`.
    #[must_use]
    pub fn compose(self, first: RigidTransform) -> Self {
        Self(self.0 * first.0)
    }
}

impl From<ObjectToWorld> for RigidTransform {
    fn from(pose: ObjectToWorld) -> Self {
        Self(pose.0)
    }
}

impl From<RigidTransform> for ObjectToWorld {
    fn from(pose: RigidTransform) -> Self {
        Self(pose.0)
    }
}

/// Inverts a rigid transform given as a rotation matrix and translation.
///
/// Returns `(Rᵗ, -Rᵗ·t)`. The rotation is assumed orthonormal.
pub fn invert(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let inverse = rotation.transpose();
    let translation = -(inverse * translation);
    (inverse, translation)
}

/// Transforms every point with `pose`, or with its inverse when `inverse` is set.
pub fn transform_points<P: Pose>(points: &[Point3<f64>], pose: P, inverse: bool) -> Vec<Point3<f64>> {
    points
        .iter()
        .map(|&p| {
            if inverse {
                pose.inverse_transform(p)
            } else {
                pose.transform(p)
            }
        })
        .collect()
}
