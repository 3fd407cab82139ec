use float_ord::FloatOrd;
use log::*;
use pop3d_core::{
    nalgebra::{Matrix3, Point3, Rotation3, Vector3},
    Error, Pose, Result, RigidTransform,
};

/// Least-squares rigid alignment of two corresponding point sets (Kabsch / Procrustes).
///
/// The estimate maps every point of the source set onto its partner in the target set with the
/// minimum sum of squared distances. Reflections are never returned: when the unconstrained
/// optimum would be a mirror image, the axis with the smallest singular value is flipped so the
/// rotation keeps `det(R) = +1`.
///
/// ```
/// use pop3d_core::{nalgebra::{Point3, Rotation3, Vector3}, Pose, RigidTransform};
/// use pop3d_geom::AbsoluteOrientation;
///
/// let truth = RigidTransform::from_parts(
///     Vector3::new(100.0, -20.0, 5.0),
///     Rotation3::from_euler_angles(0.2, -0.4, 1.3),
/// );
/// let object = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(30.0, 0.0, 0.0),
///     Point3::new(0.0, 25.0, 0.0),
///     Point3::new(5.0, 5.0, 40.0),
/// ];
/// let world: Vec<_> = object.iter().map(|&p| truth.transform(p)).collect();
/// let estimate = AbsoluteOrientation::new().estimate(&object, &world).unwrap();
/// assert!((estimate.translation() - truth.translation()).norm() < 1e-9);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct AbsoluteOrientation {
    epsilon: f64,
    max_iterations: usize,
}

impl AbsoluteOrientation {
    /// Creates an `AbsoluteOrientation` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the epsilon used in the SVD solver.
    ///
    /// Default is `1e-12`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Set the maximum number of iterations for the SVD solver.
    ///
    /// Default is `1000`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Estimates the transform taking `source` onto `target`.
    ///
    /// Any non-finite coordinate means a marker was lost and yields [`Error::PoseInvalid`]
    /// instead of a pose.
    pub fn estimate(&self, source: &[Point3<f64>], target: &[Point3<f64>]) -> Result<RigidTransform> {
        if source.len() != target.len() {
            return Err(Error::MismatchedLengths(source.len(), target.len()));
        }
        if let Some(index) = source
            .iter()
            .zip(target)
            .position(|(a, b)| !a.iter().chain(b.iter()).all(|n| n.is_finite()))
        {
            return Err(Error::PoseInvalid { index });
        }
        if source.len() < 3 {
            return Err(Error::InsufficientCorrespondences {
                required: 3,
                actual: source.len(),
            });
        }

        let source_centroid = centroid(source);
        let target_centroid = centroid(target);

        // Cross-covariance of the centered sets.
        let covariance: Matrix3<f64> = source
            .iter()
            .zip(target)
            .map(|(a, b)| (a - source_centroid) * (b - target_centroid).transpose())
            .sum();

        let svd = covariance
            .try_svd(true, true, self.epsilon, self.max_iterations)
            .ok_or(Error::SvdDidNotConverge)?;
        let u = svd.u.ok_or(Error::SvdDidNotConverge)?;
        let mut v_t = svd.v_t.ok_or(Error::SvdDidNotConverge)?;

        let mut rotation = v_t.transpose() * u.transpose();
        if rotation.determinant() < 0.0 {
            let (smallest, _) = svd
                .singular_values
                .iter()
                .enumerate()
                .min_by_key(|&(_, &n)| FloatOrd(n))
                .ok_or(Error::SvdDidNotConverge)?;
            debug!("correcting reflection in absolute orientation (axis {})", smallest);
            let flipped = -v_t.row(smallest).into_owned();
            v_t.set_row(smallest, &flipped);
            rotation = v_t.transpose() * u.transpose();
        }

        let rotation = Rotation3::from_matrix_unchecked(rotation);
        let translation = target_centroid.coords - rotation * source_centroid.coords;
        Ok(RigidTransform::from_parts(translation, rotation))
    }
}

impl Default for AbsoluteOrientation {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(52.0, 3.0, -1.0),
            Point3::new(-4.0, 37.0, 2.0),
            Point3::new(8.0, -6.0, 61.0),
            Point3::new(21.0, 19.0, 17.0),
        ]
    }

    #[test]
    fn recovers_exact_transform() {
        let truth = RigidTransform::from_parts(
            Vector3::new(-1200.0, 340.0, 95.0),
            Rotation3::from_euler_angles(2.9, -0.3, 0.7),
        );
        let source = cloud();
        let target: Vec<_> = source.iter().map(|&p| truth.transform(p)).collect();
        let estimate = AbsoluteOrientation::new().estimate(&source, &target).unwrap();
        assert_relative_eq!(
            estimate.rotation().into_inner(),
            truth.rotation().into_inner(),
            epsilon = 1e-9
        );
        assert_relative_eq!(estimate.translation(), truth.translation(), epsilon = 1e-7);
    }

    #[test]
    fn reflection_yields_proper_rotation() {
        let source = cloud();
        let target: Vec<_> = source.iter().map(|p| Point3::new(-p.x, p.y, p.z)).collect();
        let estimate = AbsoluteOrientation::new().estimate(&source, &target).unwrap();
        assert_relative_eq!(estimate.rotation().matrix().determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn lost_marker_is_pose_invalid() {
        let source = cloud();
        let mut target = source.clone();
        target[3] = Point3::new(f64::NAN, f64::NAN, f64::NAN);
        assert_eq!(
            AbsoluteOrientation::new().estimate(&source, &target),
            Err(Error::PoseInvalid { index: 3 })
        );
    }

    #[test]
    fn too_few_points() {
        let source = &cloud()[..2];
        assert_eq!(
            AbsoluteOrientation::new().estimate(source, source),
            Err(Error::InsufficientCorrespondences {
                required: 3,
                actual: 2
            })
        );
        assert_eq!(
            AbsoluteOrientation::new().estimate(&cloud(), source),
            Err(Error::MismatchedLengths(5, 2))
        );
    }
}
