//! # `pop3d`
//!
//! Multi-camera 3D reconstruction of named markers and tracked rigid objects.
//!
//! A calibrated rig of cameras observes named 2D features in every frame. This crate turns those
//! observations into 3D points in world space and recovers the poses of rigid objects (such as a
//! pigeon wearing a marker backpack) from the markers they carry.
//!
//! All of the basic types live in the root of the crate. The algorithms are grouped by concern:
//!
//! ## Modules
//! * [`camera`] - intrinsics, lens distortion and the calibrated camera model
//! * [`geom`] - absolute orientation, triangulation, averaging and error metrics
//! * [`optimize`] - bundle adjustment of triangulated points
//! * [`object`] - tracked rigid objects and their marker templates
//! * [`pipeline`] - reconstruction of whole frames and batches of frames
//!
//! ```
//! use pop3d::{
//!     camera::{BrownConrady, CalibratedCamera, CameraIntrinsics},
//!     nalgebra::{Point2, Point3, Rotation3, Vector2, Vector3},
//!     pipeline::FramePipeline,
//!     CameraToWorld, Pose, SpaceFeatures,
//! };
//!
//! let camera = |x: f64| {
//!     CalibratedCamera::new(
//!         CameraIntrinsics::identity()
//!             .focals(Vector2::new(800.0, 800.0))
//!             .principal_point(Point2::new(320.0, 240.0)),
//!         BrownConrady::none(),
//!         CameraToWorld::from_parts(Vector3::new(x, 0.0, 0.0), Rotation3::identity()),
//!     )
//! };
//! let pipeline = FramePipeline::new(vec![camera(0.0), camera(100.0)]);
//!
//! let scene: SpaceFeatures = [("beak", Point3::new(50.0, 50.0, 500.0))].into_iter().collect();
//! let frame: Vec<_> = pipeline.cameras.iter().map(|c| c.project_features(&scene)).collect();
//!
//! let result = pipeline.process(&frame).unwrap();
//! assert!((result.points["beak"] - scene["beak"]).norm() < 1e-6);
//! ```

mod settings;

pub mod object;
pub mod pipeline;

pub use pop3d_core::*;
pub use settings::*;

/// Camera models
pub mod camera {
    pub use pop3d_pinhole::*;
}

/// Computational geometry
pub mod geom {
    pub use pop3d_geom::*;
}

/// Optimizing reconstructions to fit the observations
pub mod optimize {
    pub use pop3d_optimize::*;
}
