use float_ord::FloatOrd;
use log::*;
use pop3d_core::{
    nalgebra::{Point3, Vector3},
    Observation, SpaceFeatures,
};
use std::collections::BTreeMap;

/// Robust average of repeated 3D estimates of the same feature.
///
/// While any sample lies farther than `threshold` from the mean, the single farthest sample is
/// discarded and the mean recomputed. Lost (non-finite) samples never take part.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct TrimmedMean {
    threshold: f64,
}

impl TrimmedMean {
    /// Creates a `TrimmedMean` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the largest distance from the mean a sample may have and still be kept.
    ///
    /// Default is `5.0` world units.
    #[must_use]
    pub fn threshold(self, threshold: f64) -> Self {
        Self { threshold }
    }

    /// Averages the samples, returning `None` if none of them is observed.
    ///
    /// ```
    /// use pop3d_core::nalgebra::Point3;
    /// use pop3d_geom::TrimmedMean;
    ///
    /// let samples = [
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(2.0, 0.0, 0.0),
    ///     Point3::new(90.0, 0.0, 0.0),
    /// ];
    /// let mean = TrimmedMean::new().average(&samples).unwrap();
    /// assert_eq!(mean, Point3::new(1.0, 0.0, 0.0));
    /// ```
    pub fn average(&self, samples: &[Point3<f64>]) -> Option<Point3<f64>> {
        let mut kept: Vec<Point3<f64>> = samples.iter().copied().filter(Observation::is_observed).collect();
        loop {
            let mean = mean(&kept)?;
            let (farthest, distance) = kept
                .iter()
                .map(|p| (p - mean).norm())
                .enumerate()
                .max_by_key(|&(_, d)| FloatOrd(d))?;
            if distance <= self.threshold {
                return Some(mean);
            }
            trace!("discarding sample {} at distance {}", farthest, distance);
            kept.swap_remove(farthest);
        }
    }

    /// Averages every feature over several frames or estimates.
    ///
    /// Features with no observed sample are absent from the result.
    pub fn average_features<'a>(&self, maps: impl IntoIterator<Item = &'a SpaceFeatures>) -> SpaceFeatures {
        let mut samples: BTreeMap<&str, Vec<Point3<f64>>> = BTreeMap::new();
        for map in maps {
            for (name, point) in map.observed() {
                samples.entry(name).or_default().push(point);
            }
        }
        samples
            .into_iter()
            .filter_map(|(name, points)| Some((name, self.average(&points)?)))
            .collect()
    }
}

impl Default for TrimmedMean {
    fn default() -> Self {
        Self { threshold: 5.0 }
    }
}

fn mean(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Some(Point3::from(sum / points.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ignores_lost_samples() {
        let samples = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(3.0, 1.0, 1.0),
        ];
        assert_relative_eq!(
            TrimmedMean::new().average(&samples).unwrap(),
            Point3::new(2.0, 1.0, 1.0)
        );
        assert_eq!(TrimmedMean::new().average(&samples[1..2]), None);
        assert_eq!(TrimmedMean::new().average(&[]), None);
    }

    #[test]
    fn trims_repeatedly() {
        let samples = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(40.0, 0.0, 0.0),
            Point3::new(0.0, -25.0, 0.0),
        ];
        let mean = TrimmedMean::new().average(&samples).unwrap();
        assert_relative_eq!(mean, Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0), epsilon = 1e-12);
        // A larger threshold keeps everything.
        let mean = TrimmedMean::new().threshold(100.0).average(&samples).unwrap();
        assert_relative_eq!(mean, Point3::new(41.0 / 5.0, -24.0 / 5.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn averages_feature_maps() {
        let frames: Vec<SpaceFeatures> = (0..4)
            .map(|i| {
                [
                    ("beak", Point3::new(i as f64, 0.0, 0.0)),
                    ("lost", Point3::new(f64::NAN, 0.0, 0.0)),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        let averaged = TrimmedMean::new().average_features(&frames);
        assert_eq!(averaged.len(), 1);
        assert_relative_eq!(averaged["beak"], Point3::new(1.5, 0.0, 0.0));
    }
}
