use itertools::izip;
use pop3d_core::{
    nalgebra::{Point2, Point3, Vector2},
    Error, ImageFeatures, Result, SpaceFeatures,
};
use pop3d_pinhole::CalibratedCamera;
use std::ops::Range;

/// The arrays describing one bundle adjustment of 3D points with fixed cameras.
///
/// Observation `m` is the pixel `observations[m]` of point `point_index[m]` seen by
/// camera `camera_index[m]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BundleAdjustmentProblem {
    pub points: Vec<Point3<f64>>,
    pub observations: Vec<Point2<f64>>,
    pub point_index: Vec<usize>,
    pub camera_index: Vec<usize>,
    /// Feature name of every point, empty when the problem was built from raw arrays.
    pub names: Vec<String>,
}

impl BundleAdjustmentProblem {
    pub fn new(
        points: Vec<Point3<f64>>,
        observations: Vec<Point2<f64>>,
        point_index: Vec<usize>,
        camera_index: Vec<usize>,
    ) -> Self {
        Self {
            points,
            observations,
            point_index,
            camera_index,
            names: vec![],
        }
    }

    /// Collects every observed pixel of every feature that has an initial estimate.
    ///
    /// `maps[i]` holds the pixels seen by camera `i`. Points are ordered by feature name.
    pub fn from_feature_maps(maps: &[ImageFeatures], initial: &SpaceFeatures) -> Self {
        let (names, points): (Vec<String>, Vec<Point3<f64>>) = initial
            .observed()
            .map(|(name, p)| (name.to_owned(), p))
            .unzip();
        let mut problem = Self {
            points,
            names,
            ..Self::default()
        };
        for (camera, map) in maps.iter().enumerate() {
            for (name, pixel) in map.observed() {
                if let Ok(index) = problem.names.binary_search_by(|n| n.as_str().cmp(name)) {
                    problem.observations.push(pixel);
                    problem.point_index.push(index);
                    problem.camera_index.push(camera);
                }
            }
        }
        problem
    }

    /// Checks that the index arrays line up and point at existing points and cameras.
    pub fn validate(&self, num_cameras: usize) -> Result<()> {
        let m = self.observations.len();
        if self.point_index.len() != m || self.camera_index.len() != m {
            return Err(Error::InvalidProblem(format!(
                "{} observations but {} point indices and {} camera indices",
                m,
                self.point_index.len(),
                self.camera_index.len()
            )));
        }
        if !self.names.is_empty() && self.names.len() != self.points.len() {
            return Err(Error::InvalidProblem(format!(
                "{} names for {} points",
                self.names.len(),
                self.points.len()
            )));
        }
        if let Some(&p) = self.point_index.iter().find(|&&p| p >= self.points.len()) {
            return Err(Error::InvalidProblem(format!(
                "point index {} out of range for {} points",
                p,
                self.points.len()
            )));
        }
        if let Some(&c) = self.camera_index.iter().find(|&&c| c >= num_cameras) {
            return Err(Error::InvalidProblem(format!(
                "camera index {} out of range for {} cameras",
                c, num_cameras
            )));
        }
        if let Some(m) = self
            .observations
            .iter()
            .position(|o| !o.iter().all(|n| n.is_finite()))
        {
            return Err(Error::InvalidProblem(format!("observation {} is not finite", m)));
        }
        Ok(())
    }

    pub fn num_residuals(&self) -> usize {
        2 * self.observations.len()
    }

    pub fn num_parameters(&self) -> usize {
        3 * self.points.len()
    }

    pub fn sparsity(&self) -> JacobianSparsity {
        JacobianSparsity {
            num_parameters: self.num_parameters(),
            point_index: self.point_index.clone(),
        }
    }

    /// Reprojection residuals (projection minus observation) for the given points.
    ///
    /// Returns `None` if any observed point is on or behind its camera.
    pub fn residuals(&self, cameras: &[CalibratedCamera], points: &[Point3<f64>]) -> Option<Vec<Vector2<f64>>> {
        izip!(&self.observations, &self.point_index, &self.camera_index)
            .map(|(observed, &p, &c)| Some(cameras[c].project(points[p])? - *observed))
            .collect()
    }

    /// Mean pixel distance between observations and reprojections.
    pub fn mean_reprojection_error(&self, cameras: &[CalibratedCamera], points: &[Point3<f64>]) -> Option<f64> {
        let residuals = self.residuals(cameras, points)?;
        if residuals.is_empty() {
            return None;
        }
        Some(residuals.iter().map(|r| r.norm()).sum::<f64>() / residuals.len() as f64)
    }

    /// Re-keys refined points by feature name.
    pub fn to_features(&self, points: &[Point3<f64>]) -> SpaceFeatures {
        self.names.iter().cloned().zip(points.iter().copied()).collect()
    }
}

/// Which parameters each residual depends on.
///
/// Rows `2m` and `2m + 1` belong to observation `m` and only depend on the three coordinates
/// of point `point_index[m]`. Camera parameters are fixed and have no columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JacobianSparsity {
    num_parameters: usize,
    point_index: Vec<usize>,
}

impl JacobianSparsity {
    pub fn num_residuals(&self) -> usize {
        2 * self.point_index.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }

    /// The parameter columns residual `row` depends on.
    pub fn columns(&self, row: usize) -> Range<usize> {
        let start = 3 * self.point_index[row / 2];
        start..start + 3
    }

    pub fn is_nonzero(&self, row: usize, column: usize) -> bool {
        row < self.num_residuals() && self.columns(row).contains(&column)
    }

    /// Number of structurally non-zero Jacobian entries.
    pub fn nnz(&self) -> usize {
        6 * self.point_index.len()
    }

    /// The observations whose residuals depend on each point.
    ///
    /// Points share no columns, so every block is an independent least squares problem.
    pub fn point_blocks(&self) -> Vec<Vec<usize>> {
        let mut blocks = vec![vec![]; self.num_parameters / 3];
        for (m, &p) in self.point_index.iter().enumerate() {
            blocks[p].push(m);
        }
        blocks
    }
}
