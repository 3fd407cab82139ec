//! Bundle adjustment of triangulated points against fixed, calibrated cameras.
//!
//! A [`BundleAdjustmentProblem`] lists the initial points and every pixel that observed them.
//! [`BundleAdjuster::refine`] moves the points to minimize the total squared reprojection error.

mod bundle_adjustment;
mod problem;

pub use bundle_adjustment::*;
pub use problem::*;
