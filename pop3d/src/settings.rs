use pop3d_geom::{MultiViewTriangulator, TrimmedMean};
use pop3d_optimize::BundleAdjuster;
#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings for reconstructing frames.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pop3dSettings {
    /// The smallest homogeneous coordinate a triangulated point may have before it is considered at infinity
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_triangulation_epsilon")
    )]
    pub triangulation_epsilon: f64,
    /// The largest distance (in world units) a sample may have from the mean when averaging repeated estimates
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_outlier_threshold")
    )]
    pub outlier_threshold: f64,
    /// Whether triangulated points are refined with bundle adjustment
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_refine"))]
    pub refine: bool,
    /// The settings of the bundle adjustment
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub bundle_adjustment: BundleAdjuster,
}

impl Pop3dSettings {
    pub fn triangulator(&self) -> MultiViewTriangulator {
        MultiViewTriangulator::new().epsilon(self.triangulation_epsilon)
    }

    pub fn trimmed_mean(&self) -> TrimmedMean {
        TrimmedMean::new().threshold(self.outlier_threshold)
    }
}

impl Default for Pop3dSettings {
    fn default() -> Self {
        Self {
            triangulation_epsilon: default_triangulation_epsilon(),
            outlier_threshold: default_outlier_threshold(),
            refine: default_refine(),
            bundle_adjustment: BundleAdjuster::default(),
        }
    }
}

fn default_triangulation_epsilon() -> f64 {
    1e-12
}

fn default_outlier_threshold() -> f64 {
    5.0
}

fn default_refine() -> bool {
    true
}
