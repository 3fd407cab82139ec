use crate::{Error, Result};
use nalgebra::{Matrix3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Below this value of `cos(θy)` the XYZ Euler decomposition is treated as gimbal locked.
const GIMBAL_LOCK_EPSILON: f64 = 1e-12;

/// The storage order of the four quaternion components.
///
/// The motion capture system reports quaternions with the scalar last, while the calibration
/// of the additional cameras stores it first. Values in the two orders must never be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum QuaternionConvention {
    /// `(x, y, z, w)`
    Vicon,
    /// `(w, x, y, z)`
    Custom,
}

impl QuaternionConvention {
    /// Reads four raw components stored in this convention.
    pub fn to_quaternion(self, q: [f64; 4]) -> Quaternion<f64> {
        match self {
            Self::Vicon => Quaternion::new(q[3], q[0], q[1], q[2]),
            Self::Custom => Quaternion::new(q[0], q[1], q[2], q[3]),
        }
    }

    /// Stores a quaternion as four raw components in this convention.
    pub fn from_quaternion(self, q: Quaternion<f64>) -> [f64; 4] {
        match self {
            Self::Vicon => [q.i, q.j, q.k, q.w],
            Self::Custom => [q.w, q.i, q.j, q.k],
        }
    }
}

/// A rotation tagged with the parameterization it was supplied in.
///
/// Every conversion pattern-matches on the variant, so the convention of a value travels with it
/// instead of being guessed from the number of components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum RotationRepresentation {
    /// Angles in radians about X, Y and Z, composed as `Rx·Ry·Rz`.
    EulerXyz(Vector3<f64>),
    /// Quaternion stored as `(x, y, z, w)`.
    QuaternionVicon([f64; 4]),
    /// Quaternion stored as `(w, x, y, z)`.
    QuaternionCustom([f64; 4]),
}

impl RotationRepresentation {
    /// Interprets a raw parameter list.
    ///
    /// Three values are Euler angles and four values are a quaternion stored in `convention`.
    /// Any other length, or a non-finite Euler angle, is rejected rather than replaced with an
    /// identity rotation.
    ///
    /// ```
    /// use pop3d_core::{QuaternionConvention, RotationRepresentation};
    ///
    /// let euler = RotationRepresentation::from_params(&[0.1, 0.2, 0.3], QuaternionConvention::Vicon);
    /// assert!(matches!(euler, Ok(RotationRepresentation::EulerXyz(_))));
    /// let bad = RotationRepresentation::from_params(&[0.1, 0.2], QuaternionConvention::Vicon);
    /// assert!(bad.is_err());
    /// ```
    pub fn from_params(params: &[f64], convention: QuaternionConvention) -> Result<Self> {
        match *params {
            [x, y, z] => euler_checked(Vector3::new(x, y, z)).map(Self::EulerXyz),
            [a, b, c, d] => Ok(Self::from_quaternion_params([a, b, c, d], convention)),
            _ => Err(Error::InvalidRotationFormat { len: params.len() }),
        }
    }

    fn from_quaternion_params(q: [f64; 4], convention: QuaternionConvention) -> Self {
        match convention {
            QuaternionConvention::Vicon => Self::QuaternionVicon(q),
            QuaternionConvention::Custom => Self::QuaternionCustom(q),
        }
    }

    /// Converts the rotation to a rotation matrix.
    pub fn to_rotation(&self) -> Result<Rotation3<f64>> {
        match *self {
            Self::EulerXyz(theta) => euler_checked(theta).map(euler_to_rotation),
            Self::QuaternionVicon(q) => quaternion_to_rotation(q, QuaternionConvention::Vicon),
            Self::QuaternionCustom(q) => quaternion_to_rotation(q, QuaternionConvention::Custom),
        }
    }

    /// Converts the rotation to a raw 3x3 matrix.
    pub fn to_matrix(&self) -> Result<Matrix3<f64>> {
        self.to_rotation().map(Rotation3::into_inner)
    }

    /// Expresses `rotation` in the same parameterization as `self`.
    pub fn with_rotation(&self, rotation: &Rotation3<f64>) -> Self {
        match self {
            Self::EulerXyz(_) => Self::EulerXyz(rotation_to_euler(rotation)),
            Self::QuaternionVicon(_) => {
                Self::QuaternionVicon(rotation_to_quaternion(rotation, QuaternionConvention::Vicon))
            }
            Self::QuaternionCustom(_) => Self::QuaternionCustom(rotation_to_quaternion(
                rotation,
                QuaternionConvention::Custom,
            )),
        }
    }

    /// The inverse rotation, in the same parameterization.
    pub fn inverse(&self) -> Result<Self> {
        match *self {
            Self::QuaternionVicon(q) => {
                let conjugate = quaternion_checked(q, QuaternionConvention::Vicon)?.inverse();
                Ok(Self::QuaternionVicon(
                    QuaternionConvention::Vicon.from_quaternion(*conjugate.quaternion()),
                ))
            }
            Self::QuaternionCustom(q) => {
                let conjugate = quaternion_checked(q, QuaternionConvention::Custom)?.inverse();
                Ok(Self::QuaternionCustom(
                    QuaternionConvention::Custom.from_quaternion(*conjugate.quaternion()),
                ))
            }
            Self::EulerXyz(_) => Ok(self.with_rotation(&self.to_rotation()?.inverse())),
        }
    }
}

/// Composes `Rx(θx)·Ry(θy)·Rz(θz)`.
///
/// The order matters: any other composition gives a different rotation for the same angles.
///
/// ```
/// use pop3d_core::{euler_to_rotation, nalgebra::Vector3};
///
/// let r = euler_to_rotation(Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
/// let x = r * Vector3::x();
/// assert!((x - Vector3::y()).norm() < 1e-12);
/// ```
pub fn euler_to_rotation(theta: Vector3<f64>) -> Rotation3<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), theta.x);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), theta.y);
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), theta.z);
    rx * ry * rz
}

/// Matrix form of [`euler_to_rotation`].
pub fn euler_to_matrix(theta: Vector3<f64>) -> Matrix3<f64> {
    euler_to_rotation(theta).into_inner()
}

/// Decomposes a rotation into XYZ Euler angles such that `euler_to_rotation` rebuilds it.
///
/// `θy` is kept in `[-π/2, π/2]`. When `cos(θy)` vanishes only `θx ± θz` is observable, so
/// `θz` is fixed to zero.
pub fn rotation_to_euler(rotation: &Rotation3<f64>) -> Vector3<f64> {
    let r = rotation.matrix();
    let sin_y = r[(0, 2)].clamp(-1.0, 1.0);
    let y = sin_y.asin();
    let cos_y = (r[(0, 0)] * r[(0, 0)] + r[(0, 1)] * r[(0, 1)]).sqrt();
    if cos_y > GIMBAL_LOCK_EPSILON {
        let x = (-r[(1, 2)]).atan2(r[(2, 2)]);
        let z = (-r[(0, 1)]).atan2(r[(0, 0)]);
        Vector3::new(x, y, z)
    } else {
        let x = r[(2, 1)].atan2(r[(1, 1)]);
        Vector3::new(x, y, 0.0)
    }
}

/// Matrix form of [`rotation_to_euler`]. The matrix is assumed orthonormal.
pub fn matrix_to_euler(matrix: &Matrix3<f64>) -> Vector3<f64> {
    rotation_to_euler(&Rotation3::from_matrix_unchecked(*matrix))
}

fn euler_checked(theta: Vector3<f64>) -> Result<Vector3<f64>> {
    if theta.iter().all(|a| a.is_finite()) {
        Ok(theta)
    } else {
        Err(Error::InvalidRotationFormat { len: 3 })
    }
}

fn quaternion_checked(q: [f64; 4], convention: QuaternionConvention) -> Result<UnitQuaternion<f64>> {
    let quaternion = convention.to_quaternion(q);
    let norm = quaternion.norm();
    if !norm.is_finite() || norm == 0.0 {
        return Err(Error::InvalidRotationFormat { len: 4 });
    }
    Ok(Unit::new_normalize(quaternion))
}

/// Converts four quaternion components stored in `convention` to a rotation.
///
/// Non-unit quaternions are normalized. A zero or non-finite quaternion is rejected.
pub fn quaternion_to_rotation(
    q: [f64; 4],
    convention: QuaternionConvention,
) -> Result<Rotation3<f64>> {
    quaternion_checked(q, convention).map(|q| q.to_rotation_matrix())
}

/// Matrix form of [`quaternion_to_rotation`].
pub fn quaternion_to_matrix(q: [f64; 4], convention: QuaternionConvention) -> Result<Matrix3<f64>> {
    quaternion_to_rotation(q, convention).map(Rotation3::into_inner)
}

/// Converts a rotation to a unit quaternion stored in `convention`.
///
/// `q` and `-q` describe the same rotation; the returned one always has a non-negative scalar part.
pub fn rotation_to_quaternion(rotation: &Rotation3<f64>, convention: QuaternionConvention) -> [f64; 4] {
    let mut q = *UnitQuaternion::from_rotation_matrix(rotation).quaternion();
    if q.w < 0.0 {
        q = -q;
    }
    convention.from_quaternion(q)
}

/// Matrix form of [`rotation_to_quaternion`]. The matrix is assumed orthonormal.
pub fn matrix_to_quaternion(matrix: &Matrix3<f64>, convention: QuaternionConvention) -> [f64; 4] {
    rotation_to_quaternion(&Rotation3::from_matrix_unchecked(*matrix), convention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn euler_axis_order() {
        let theta = Vector3::new(0.3, -0.7, 1.1);
        let expected = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.3).into_inner()
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -0.7).into_inner()
            * Rotation3::from_axis_angle(&Vector3::z_axis(), 1.1).into_inner();
        assert_relative_eq!(euler_to_matrix(theta), expected, epsilon = 1e-12);
        // Reversed composition must differ.
        let reversed = Rotation3::from_axis_angle(&Vector3::z_axis(), 1.1)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -0.7)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), 0.3);
        assert!((reversed.into_inner() - expected).norm() > 1e-3);
    }

    #[test]
    fn euler_decomposition() {
        for theta in [
            Vector3::new(0.3, -0.7, 1.1),
            Vector3::new(-2.5, 1.2, -3.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(PI - 0.1, 0.4, -0.2),
        ] {
            assert_relative_eq!(
                matrix_to_euler(&euler_to_matrix(theta)),
                theta,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn euler_gimbal_lock() {
        let theta = Vector3::new(0.4, FRAC_PI_2, 0.3);
        let matrix = euler_to_matrix(theta);
        let recovered = matrix_to_euler(&matrix);
        assert_eq!(recovered.z, 0.0);
        assert_relative_eq!(euler_to_matrix(recovered), matrix, epsilon = 1e-9);
    }

    #[test]
    fn conventions_differ_only_in_order() {
        let vicon = [0.1, 0.2, 0.3, 0.9];
        let custom = [0.9, 0.1, 0.2, 0.3];
        let a = quaternion_to_matrix(vicon, QuaternionConvention::Vicon).unwrap();
        let b = quaternion_to_matrix(custom, QuaternionConvention::Custom).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-12);
        let c = quaternion_to_matrix(vicon, QuaternionConvention::Custom).unwrap();
        assert!((a - c).norm() > 1e-3);
    }

    #[test]
    fn quaternion_sign_is_canonical() {
        let q = [-0.1, -0.2, -0.3, -0.9];
        let r = quaternion_to_rotation(q, QuaternionConvention::Vicon).unwrap();
        let back = rotation_to_quaternion(&r, QuaternionConvention::Vicon);
        assert!(back[3] > 0.0);
        let norm = (0.01f64 + 0.04 + 0.09 + 0.81).sqrt();
        assert_relative_eq!(back[0], 0.1 / norm, epsilon = 1e-12);
    }

    #[test]
    fn rejects_degenerate_quaternion() {
        assert_eq!(
            quaternion_to_rotation([0.0; 4], QuaternionConvention::Custom),
            Err(Error::InvalidRotationFormat { len: 4 })
        );
        assert!(quaternion_to_rotation([f64::NAN, 0.0, 0.0, 1.0], QuaternionConvention::Vicon).is_err());
    }

    #[test]
    fn rejects_non_finite_euler_angles() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                RotationRepresentation::from_params(&[0.1, bad, 0.3], QuaternionConvention::Vicon),
                Err(Error::InvalidRotationFormat { len: 3 })
            );
            let euler = RotationRepresentation::EulerXyz(Vector3::new(bad, 0.2, 0.3));
            assert_eq!(euler.to_rotation(), Err(Error::InvalidRotationFormat { len: 3 }));
            assert!(euler.inverse().is_err());
        }
    }

    #[test]
    fn rejects_wrong_lengths() {
        for len in [0usize, 1, 2, 5, 9] {
            let params = vec![0.1; len];
            assert_eq!(
                RotationRepresentation::from_params(&params, QuaternionConvention::Vicon),
                Err(Error::InvalidRotationFormat { len })
            );
        }
    }

    #[test]
    fn inverse_in_every_representation() {
        let reps = [
            RotationRepresentation::EulerXyz(Vector3::new(0.3, -0.2, 0.9)),
            RotationRepresentation::QuaternionVicon([0.2, -0.1, 0.4, 0.8]),
            RotationRepresentation::QuaternionCustom([0.8, 0.2, -0.1, 0.4]),
        ];
        for rep in reps {
            let inverse = rep.inverse().unwrap();
            assert_eq!(
                core::mem::discriminant(&inverse),
                core::mem::discriminant(&rep)
            );
            let product = rep.to_matrix().unwrap() * inverse.to_matrix().unwrap();
            assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-12);
        }
    }
}
