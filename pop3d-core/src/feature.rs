use crate::Pose;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Point2, Point3};
use std::collections::BTreeMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A coordinate that may stand for "not observed in this frame".
///
/// 2D detections use `(0, 0)` for a missing keypoint and 3D tracking reports a lost marker as NaN.
pub trait Observation: Copy {
    /// Returns `true` if the value carries a real measurement.
    fn is_observed(&self) -> bool;
}

impl Observation for Point2<f64> {
    fn is_observed(&self) -> bool {
        self.iter().all(|n| n.is_finite()) && !(self.x == 0.0 && self.y == 0.0)
    }
}

impl Observation for Point3<f64> {
    fn is_observed(&self) -> bool {
        self.iter().all(|n| n.is_finite())
    }
}

/// Named keypoints of a single frame, iterated in name order.
///
/// Names are unique per frame. A map is built fresh for every frame and passed by value,
/// it is never shared between frames.
#[derive(Debug, Clone, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureMap<P>(pub BTreeMap<String, P>);

/// 2D pixel observations of one camera.
pub type ImageFeatures = FeatureMap<Point2<f64>>;

/// 3D points in a single space (world, object or camera).
pub type SpaceFeatures = FeatureMap<Point3<f64>>;

impl<P> FeatureMap<P> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }
}

impl<P> Default for FeatureMap<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Observation> FeatureMap<P> {
    /// Iterates over the entries that are actually observed.
    pub fn observed(&self) -> impl Iterator<Item = (&str, P)> + '_ {
        self.0
            .iter()
            .filter(|(_, p)| p.is_observed())
            .map(|(name, &p)| (name.as_str(), p))
    }

    /// Looks up an entry, treating the unobserved sentinel as absent.
    pub fn get_observed(&self, name: &str) -> Option<P> {
        self.0.get(name).copied().filter(Observation::is_observed)
    }

    /// Number of observed entries.
    pub fn observed_count(&self) -> usize {
        self.observed().count()
    }
}

impl SpaceFeatures {
    /// Maps every point through `pose`, or its inverse when `inverse` is set.
    ///
    /// Lost (NaN) markers stay NaN.
    pub fn transformed<T: Pose>(&self, pose: T, inverse: bool) -> Self {
        self.0
            .iter()
            .map(|(name, &p)| {
                let p = if inverse {
                    pose.inverse_transform(p)
                } else {
                    pose.transform(p)
                };
                (name.clone(), p)
            })
            .collect()
    }
}

impl<P, S: Into<String>> FromIterator<(S, P)> for FeatureMap<P> {
    fn from_iter<I: IntoIterator<Item = (S, P)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, p)| (name.into(), p)).collect())
    }
}

impl<P, S: Into<String>> Extend<(S, P)> for FeatureMap<P> {
    fn extend<I: IntoIterator<Item = (S, P)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(name, p)| (name.into(), p)));
    }
}

impl<P> IntoIterator for FeatureMap<P> {
    type Item = (String, P);
    type IntoIter = std::collections::btree_map::IntoIter<String, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
