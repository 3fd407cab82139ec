//! Error measures between point sets and between observations and reprojections.

use pop3d_core::{nalgebra::Point3, Error, ImageFeatures, Result, SpaceFeatures};
use pop3d_pinhole::CalibratedCamera;

/// Euclidean distance between each pair of corresponding points.
pub fn rms_error_per_point(a: &[Point3<f64>], b: &[Point3<f64>]) -> Result<Vec<f64>> {
    if a.len() != b.len() {
        return Err(Error::MismatchedLengths(a.len(), b.len()));
    }
    Ok(a.iter().zip(b).map(|(a, b)| (a - b).norm()).collect())
}

/// Mean Euclidean distance between corresponding points, `0.0` for empty sets.
pub fn rms_error(a: &[Point3<f64>], b: &[Point3<f64>]) -> Result<f64> {
    let errors = rms_error_per_point(a, b)?;
    if errors.is_empty() {
        return Ok(0.0);
    }
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

/// Pixel distance between every observed feature and the projection of its world point.
///
/// Features that are unobserved, missing from `points`, or behind the camera are left out.
pub fn reprojection_errors(
    camera: &CalibratedCamera,
    points: &SpaceFeatures,
    observations: &ImageFeatures,
) -> ImageErrors {
    observations
        .observed()
        .filter_map(|(name, observed)| {
            let projected = camera.project(points.get_observed(name)?)?;
            Some((name.to_owned(), (projected - observed).norm()))
        })
        .collect()
}

/// Per-feature reprojection error in pixels.
pub type ImageErrors = std::collections::BTreeMap<String, f64>;

/// Mean reprojection error over all cameras of a frame, or `None` if nothing could be compared.
pub fn mean_reprojection_error(
    cameras: &[CalibratedCamera],
    points: &SpaceFeatures,
    observations: &[ImageFeatures],
) -> Option<f64> {
    let (sum, count) = cameras
        .iter()
        .zip(observations)
        .flat_map(|(camera, map)| reprojection_errors(camera, points, map).into_values())
        .fold((0.0, 0usize), |(sum, count), e| (sum + e, count + 1));
    (count != 0).then(|| sum / count as f64)
}
