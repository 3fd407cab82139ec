//! Rigid objects carrying a known constellation of markers.

use log::*;
use pop3d_core::{Error, ObjectToWorld, Pose, Result, SpaceFeatures};
use pop3d_geom::{AbsoluteOrientation, TrimmedMean};

/// A rigid body whose markers are known in its own coordinate frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub name: String,
    /// Marker positions in object space.
    pub template: SpaceFeatures,
}

impl TrackedObject {
    pub fn new(name: impl Into<String>, template: SpaceFeatures) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    /// Builds a template by robustly averaging several object-space observations of the markers.
    pub fn from_samples<'a>(
        name: impl Into<String>,
        samples: impl IntoIterator<Item = &'a SpaceFeatures>,
        consensus: &TrimmedMean,
    ) -> Self {
        Self::new(name, consensus.average_features(samples))
    }

    /// Finds the pose that carries the template onto the markers seen in world space.
    ///
    /// Only markers present in both maps take part. A lost marker among them makes the pose
    /// invalid for this frame.
    pub fn estimate_pose(&self, world_markers: &SpaceFeatures) -> Result<ObjectToWorld> {
        self.estimate_pose_with(&AbsoluteOrientation::new(), world_markers)
    }

    pub fn estimate_pose_with(
        &self,
        estimator: &AbsoluteOrientation,
        world_markers: &SpaceFeatures,
    ) -> Result<ObjectToWorld> {
        let (source, target): (Vec<_>, Vec<_>) = self
            .template
            .iter()
            .filter_map(|(name, &object)| world_markers.get(name).map(|&world| (object, world)))
            .unzip();
        trace!(
            "object {} matched {} of {} markers",
            self.name,
            source.len(),
            self.template.len()
        );
        estimator
            .estimate(&source, &target)
            .map(ObjectToWorld::from)
            .map_err(|e| {
                if let Error::PoseInvalid { index } = e {
                    debug!("object {} lost marker {} of the match", self.name, index);
                }
                e
            })
    }

    /// The template placed in world space.
    pub fn placed(&self, pose: ObjectToWorld) -> SpaceFeatures {
        to_world(pose, &self.template)
    }
}

/// Carries object-space features into world space.
pub fn to_world(pose: ObjectToWorld, features: &SpaceFeatures) -> SpaceFeatures {
    features.transformed(pose, false)
}

/// Carries world-space features into the space of the object.
pub fn to_object(pose: ObjectToWorld, features: &SpaceFeatures) -> SpaceFeatures {
    features.transformed(pose.inverse(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pop3d_core::{
        nalgebra::{Point3, Rotation3, Vector3},
        RotationRepresentation,
    };

    fn template() -> SpaceFeatures {
        [
            ("head", Point3::new(0.0, 0.0, 30.0)),
            ("beak", Point3::new(25.0, 0.0, 20.0)),
            ("left", Point3::new(-5.0, 15.0, 0.0)),
            ("right", Point3::new(-5.0, -15.0, 0.0)),
        ]
        .into_iter()
        .collect()
    }

    fn pose() -> ObjectToWorld {
        let rotation = RotationRepresentation::EulerXyz(Vector3::new(0.2, -0.4, 1.1));
        ObjectToWorld::from_representation(&rotation, Vector3::new(120.0, -40.0, 300.0)).unwrap()
    }

    #[test]
    fn recovers_object_pose() {
        let object = TrackedObject::new("pigeon", template());
        let world = object.placed(pose());
        let estimate = object.estimate_pose(&world).unwrap();
        assert_relative_eq!(
            estimate.isometry().to_homogeneous(),
            pose().isometry().to_homogeneous(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn ignores_markers_missing_from_template() {
        let object = TrackedObject::new("pigeon", template());
        let mut world = object.placed(pose());
        world.insert("backpack".to_owned(), Point3::new(1e4, 1e4, 1e4));
        let estimate = object.estimate_pose(&world).unwrap();
        assert_relative_eq!(estimate.translation(), pose().translation(), epsilon = 1e-9);
    }

    #[test]
    fn lost_marker_invalidates_pose() {
        let object = TrackedObject::new("pigeon", template());
        let mut world = object.placed(pose());
        world.insert("beak".to_owned(), Point3::new(f64::NAN, f64::NAN, f64::NAN));
        assert!(matches!(
            object.estimate_pose(&world),
            Err(Error::PoseInvalid { .. })
        ));
    }

    #[test]
    fn two_markers_are_not_enough() {
        let object = TrackedObject::new("pigeon", template());
        let world: SpaceFeatures = object
            .placed(pose())
            .into_iter()
            .filter(|(name, _)| name == "head" || name == "left")
            .collect();
        assert_eq!(
            object.estimate_pose(&world),
            Err(Error::InsufficientCorrespondences {
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn world_and_object_round_trip() {
        let world = to_world(pose(), &template());
        let back = to_object(pose(), &world);
        for (name, point) in template().iter() {
            assert_relative_eq!(back[name], *point, epsilon = 1e-9);
        }
        let identity = ObjectToWorld::from_parts(Vector3::zeros(), Rotation3::identity());
        assert_eq!(to_world(identity, &template()), template());
    }

    #[test]
    fn template_from_noisy_samples() {
        let clean = template();
        let mut shifted = clean.clone();
        shifted.insert("head".to_owned(), Point3::new(0.0, 0.0, 90.0));
        let samples = [clean.clone(), clean.clone(), clean.clone(), shifted];
        let object = TrackedObject::from_samples("pigeon", &samples, &TrimmedMean::new());
        assert_relative_eq!(object.template["head"], clean["head"], epsilon = 1e-12);
    }
}
