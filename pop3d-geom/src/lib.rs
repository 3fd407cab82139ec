//! Geometry algorithms for reconstructing a motion capture frame from a calibrated camera rig.
//!
//! ## Absolute orientation
//!
//! [`AbsoluteOrientation`] recovers the rigid transform between two corresponding point sets.
//! This is how the pose of a tracked object is found from its marker template and the markers
//! seen by the motion capture system.
//!
//! ## Triangulation
//!
//! [`MultiViewTriangulator`] picks the two views sharing the most named features and solves
//! the linear system for each one. The result is a starting point for bundle adjustment, which
//! uses every view that observed a feature.
//!
//! - `p` the point we are trying to triangulate
//! - `a` the keypoint on camera A
//! - `b` the keypoint on camera B
//! - `O` the optical center of a camera
//! - `@` the virtual image plane
//!
//! ```text
//!                        @
//!                        @
//!               p--------b--------O
//!              /         @
//!             /          @
//!            /           @
//!           /            @
//!   @@@@@@@a@@@@@
//!         /
//!        /
//!       /
//!      O
//! ```

mod absolute_orientation;
mod consensus;
pub mod metrics;
pub mod triangulation;

pub use absolute_orientation::*;
pub use consensus::*;
pub use triangulation::{
    compute_extrinsic, filter_common_features, select_best_pair, InitialTriangulation,
    MultiViewTriangulator,
};
