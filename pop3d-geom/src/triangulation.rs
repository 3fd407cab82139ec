use float_ord::FloatOrd;
use itertools::Itertools;
use log::*;
use pop3d_core::{
    nalgebra::{Matrix3x4, Matrix4, Point2, Point3, RowVector4, Vector4},
    CameraToCamera, Error, ImageFeatures, Pose, Result, SpaceFeatures,
};
use pop3d_pinhole::CalibratedCamera;

/// Keeps only the features observed in both maps.
///
/// Both returned maps hold exactly the same names, so their values line up index for index.
/// A feature at the `(0, 0)` sentinel in either map is dropped from both.
pub fn filter_common_features(a: &ImageFeatures, b: &ImageFeatures) -> (ImageFeatures, ImageFeatures) {
    a.observed()
        .filter_map(|(name, pa)| Some(((name, pa), (name, b.get_observed(name)?))))
        .unzip()
}

fn common_count(a: &ImageFeatures, b: &ImageFeatures) -> usize {
    a.observed()
        .filter(|&(name, _)| b.get_observed(name).is_some())
        .count()
}

/// Picks the pair of views sharing the most observed features.
///
/// Pairs are enumerated as `(0, 1), (0, 2), ..., (1, 2), ...` and the first pair reaching the
/// maximum wins ties. Returns `None` when there are fewer than two views.
pub fn select_best_pair(maps: &[ImageFeatures]) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), usize)> = None;
    for (i, j) in (0..maps.len()).tuple_combinations() {
        let count = common_count(&maps[i], &maps[j]);
        trace!("views ({}, {}) share {} features", i, j, count);
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some(((i, j), count));
        }
    }
    best.map(|(pair, _)| pair)
}

/// The transform taking points in the space of `cam2` into the space of `cam1`.
///
/// Rotation is `R1⁻¹·R2` and translation is `R1⁻¹·(t2 - t1)` for camera-to-world poses.
pub fn compute_extrinsic(cam1: &CalibratedCamera, cam2: &CalibratedCamera) -> CameraToCamera {
    cam1.extrinsic_to(cam2)
}

/// Result of triangulating every feature from whichever views observed it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InitialTriangulation {
    /// World points of all features observed in at least two views.
    pub points: SpaceFeatures,
    /// Features observed in fewer than two views.
    pub skipped: Vec<String>,
}

/// Linear (DLT) triangulation over a rig of calibrated cameras.
///
/// Each view contributes the two rows `x·P₃ - P₁` and `y·P₃ - P₂` of its projection matrix
/// `P` and the point is the right singular vector of the smallest singular value.
/// Observations are undistorted before they enter the linear system.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct MultiViewTriangulator {
    epsilon: f64,
    svd_epsilon: f64,
    max_iterations: usize,
}

impl MultiViewTriangulator {
    /// Creates a `MultiViewTriangulator` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the smallest magnitude of the homogeneous `w` of the unit-norm solution that is
    /// still considered a finite point.
    ///
    /// Default is `1e-12`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Set the epsilon used in the SVD solver.
    ///
    /// Default is `1e-15`.
    #[must_use]
    pub fn svd_epsilon(self, svd_epsilon: f64) -> Self {
        Self {
            svd_epsilon,
            ..self
        }
    }

    /// Set the maximum number of iterations for the SVD solver.
    ///
    /// Default is `1000`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Triangulates one point from two projection matrices and its pixel in each view.
    pub fn triangulate_point(
        &self,
        proj1: &Matrix3x4<f64>,
        proj2: &Matrix3x4<f64>,
        point1: Point2<f64>,
        point2: Point2<f64>,
    ) -> Result<Point3<f64>> {
        let row = |proj: &Matrix3x4<f64>, coordinate: f64, axis: usize| -> RowVector4<f64> {
            proj.row(2) * coordinate - proj.row(axis)
        };
        let mut design = Matrix4::from_rows(&[
            row(proj1, point1.x, 0),
            row(proj1, point1.y, 1),
            row(proj2, point2.x, 0),
            row(proj2, point2.y, 1),
        ]);

        // Pixel rows and world columns differ by orders of magnitude, so equilibrate both.
        for mut row in design.row_iter_mut() {
            let norm = row.norm();
            if norm > 0.0 {
                row /= norm;
            }
        }
        let scales = Vector4::from_iterator(
            design
                .column_iter()
                .map(|column| column.norm())
                .map(|norm| if norm > 0.0 { norm } else { 1.0 }),
        );
        for (mut column, &scale) in design.column_iter_mut().zip(scales.iter()) {
            column /= scale;
        }

        let svd = design
            .try_svd(false, true, self.svd_epsilon, self.max_iterations)
            .ok_or(Error::SvdDidNotConverge)?;
        let v_t = svd.v_t.ok_or(Error::SvdDidNotConverge)?;

        // The null space lies along the smallest singular value.
        let (ix, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by_key(|&(_, &n)| FloatOrd(n))
            .ok_or(Error::SvdDidNotConverge)?;
        let homogeneous = v_t.row(ix).transpose().component_div(&scales).normalize();

        let w = homogeneous.w;
        if !w.is_finite() || w.abs() < self.epsilon {
            return Err(Error::TriangulationDegenerate { w });
        }
        Ok(Point3::from(homogeneous.xyz() / w))
    }

    /// Triangulates corresponding pixel lists with the projection matrices of two views.
    ///
    /// The output is in whatever space the projection matrices map from.
    pub fn triangulate(
        &self,
        proj1: &Matrix3x4<f64>,
        proj2: &Matrix3x4<f64>,
        points1: &[Point2<f64>],
        points2: &[Point2<f64>],
    ) -> Result<Vec<Point3<f64>>> {
        if points1.len() != points2.len() {
            return Err(Error::MismatchedLengths(points1.len(), points2.len()));
        }
        points1
            .iter()
            .zip(points2)
            .map(|(&a, &b)| self.triangulate_point(proj1, proj2, a, b))
            .collect()
    }

    /// Triangulates pixels of two cameras into the space of `reference`.
    ///
    /// The projection matrices are `K_ref·[I|0]` and `K_other·[R|t]`, where `[R|t]` takes points
    /// of the reference camera into the other camera.
    pub fn triangulate_pair(
        &self,
        reference: &CalibratedCamera,
        other: &CalibratedCamera,
        reference_pixels: &[Point2<f64>],
        other_pixels: &[Point2<f64>],
    ) -> Result<Vec<Point3<f64>>> {
        let proj1 = reference.intrinsics.matrix() * CameraToCamera::identity().matrix3x4();
        let proj2 = other.intrinsics.matrix() * compute_extrinsic(other, reference).matrix3x4();
        let undistort = |camera: &CalibratedCamera, pixels: &[Point2<f64>]| -> Vec<Point2<f64>> {
            pixels.iter().map(|&p| camera.undistort_pixel(p)).collect()
        };
        self.triangulate(
            &proj1,
            &proj2,
            &undistort(reference, reference_pixels),
            &undistort(other, other_pixels),
        )
    }

    /// Triangulates a frame from the pair of views that share the most features.
    ///
    /// Returns the points in the space of the reference camera (the first camera of the pair)
    /// and the index of that camera. When the best pair shares nothing, the map is empty.
    pub fn triangulate_n_view(
        &self,
        cameras: &[CalibratedCamera],
        maps: &[ImageFeatures],
    ) -> Result<(SpaceFeatures, usize)> {
        if cameras.len() != maps.len() {
            return Err(Error::MismatchedLengths(cameras.len(), maps.len()));
        }
        let (i, j) = select_best_pair(maps).ok_or(Error::InsufficientViews {
            actual: maps.len(),
        })?;
        let (a, b) = filter_common_features(&maps[i], &maps[j]);
        debug!("triangulating {} features from views ({}, {})", a.len(), i, j);
        if a.is_empty() {
            return Ok((SpaceFeatures::new(), i));
        }

        let a_pixels: Vec<_> = a.values().copied().collect();
        let b_pixels: Vec<_> = b.values().copied().collect();
        let points = self.triangulate_pair(&cameras[i], &cameras[j], &a_pixels, &b_pixels)?;
        let features = a.into_iter().map(|(name, _)| name).zip(points).collect();
        Ok((features, i))
    }

    /// Same as [`MultiViewTriangulator::triangulate_n_view`], mapped into world space.
    pub fn triangulate_to_world(
        &self,
        cameras: &[CalibratedCamera],
        maps: &[ImageFeatures],
    ) -> Result<SpaceFeatures> {
        let (points, reference) = self.triangulate_n_view(cameras, maps)?;
        Ok(points.transformed(cameras[reference].pose, false))
    }

    /// Triangulates every feature in world space from the first two views (by index) observing it.
    ///
    /// Features seen by fewer than two views are reported in [`InitialTriangulation::skipped`].
    pub fn initial_triangulation(
        &self,
        cameras: &[CalibratedCamera],
        maps: &[ImageFeatures],
    ) -> Result<InitialTriangulation> {
        if cameras.len() != maps.len() {
            return Err(Error::MismatchedLengths(cameras.len(), maps.len()));
        }
        if maps.len() < 2 {
            return Err(Error::InsufficientViews {
                actual: maps.len(),
            });
        }
        let projections: Vec<Matrix3x4<f64>> =
            cameras.iter().map(CalibratedCamera::projection_matrix).collect();

        let mut result = InitialTriangulation::default();
        let names: Vec<&str> = maps
            .iter()
            .flat_map(|map| map.keys().map(String::as_str))
            .sorted()
            .dedup()
            .collect();
        for name in names {
            let mut views = maps
                .iter()
                .enumerate()
                .filter_map(|(ix, map)| map.get_observed(name).map(|p| (ix, p)));
            match (views.next(), views.next()) {
                (Some((ia, pa)), Some((ib, pb))) => {
                    let point = self.triangulate_point(
                        &projections[ia],
                        &projections[ib],
                        cameras[ia].undistort_pixel(pa),
                        cameras[ib].undistort_pixel(pb),
                    )?;
                    result.points.insert(name.to_owned(), point);
                }
                _ => {
                    trace!("feature {} is observed in fewer than two views", name);
                    result.skipped.push(name.to_owned());
                }
            }
        }
        Ok(result)
    }
}

impl Default for MultiViewTriangulator {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            svd_epsilon: 1e-15,
            max_iterations: 1000,
        }
    }
}
