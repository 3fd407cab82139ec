use thiserror::Error;

/// Errors produced by the reconstruction engine.
///
/// [`Error::PoseInvalid`] and [`Error::InsufficientViews`] are routine while markers drop out
/// and callers skip the affected frame or feature. [`Error::InvalidRotationFormat`] and
/// [`Error::TriangulationDegenerate`] point at corrupted upstream data and abort the frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A rotation parameter list was neither 3 (Euler) nor 4 (quaternion) values long,
    /// or the quaternion had no direction.
    #[error("rotation must have 3 (euler) or 4 (quaternion) finite components, got {len}")]
    InvalidRotationFormat { len: usize },

    /// A correspondence used for pose estimation was NaN (lost marker).
    #[error("pose invalid: correspondence {index} is not finite")]
    PoseInvalid { index: usize },

    /// The homogeneous coordinate of a triangulated point was (nearly) zero.
    #[error("triangulated point is at infinity (w = {w:e})")]
    TriangulationDegenerate { w: f64 },

    /// Fewer than two cameras were available or observed a feature.
    #[error("at least 2 views are required, got {actual}")]
    InsufficientViews { actual: usize },

    /// Too few point correspondences for the requested estimate.
    #[error("at least {required} correspondences are required, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },

    /// Two point lists that must correspond index-for-index have different lengths.
    #[error("mismatched correspondence lengths: {0} != {1}")]
    MismatchedLengths(usize, usize),

    /// A distortion vector with an unsupported number of coefficients.
    #[error("distortion must have 4 or 5 coefficients, got {len}")]
    InvalidDistortion { len: usize },

    /// The intrinsic matrix cannot be used for projection.
    #[error("intrinsic matrix is singular")]
    SingularIntrinsics,

    /// The singular value decomposition did not converge.
    #[error("singular value decomposition did not converge")]
    SvdDidNotConverge,

    /// The index arrays of a bundle adjustment problem are inconsistent.
    #[error("invalid bundle adjustment problem: {0}")]
    InvalidProblem(String),
}

pub type Result<T> = core::result::Result<T, Error>;
