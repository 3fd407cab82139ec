use crate::BundleAdjustmentProblem;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::*;
use pop3d_core::{
    nalgebra::{
        dimension::{Dynamic, U1, U3},
        storage::Owned,
        DVector, OMatrix, Point2, Point3, VecStorage, Vector3,
    },
    Result,
};
use pop3d_pinhole::CalibratedCamera;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Whether the refined points can be trusted as a converged solution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum RefinementStatus {
    Converged,
    /// At least one point was left in place or stopped before converging.
    Degraded,
}

/// What happened to a single point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum PointOutcome {
    /// Fewer than two observations constrain the point, so it stays where it is.
    Unconstrained,
    /// The point lies on or behind a camera that observed it and stays where it is.
    NotProjectable,
    /// The optimizer converged.
    Converged,
    /// The optimizer ran out of patience or failed numerically. The point is the better of the
    /// start and the last iterate.
    Stopped,
}

impl PointOutcome {
    pub fn status(self) -> RefinementStatus {
        match self {
            Self::NotProjectable | Self::Stopped => RefinementStatus::Degraded,
            Self::Unconstrained | Self::Converged => RefinementStatus::Converged,
        }
    }
}

/// The outcome of [`BundleAdjuster::refine`].
#[derive(Clone, Debug, PartialEq)]
pub struct Refinement {
    pub points: Vec<Point3<f64>>,
    pub status: RefinementStatus,
    /// One entry per point.
    pub outcomes: Vec<PointOutcome>,
    /// Residual evaluations over all points.
    pub evaluations: usize,
    /// Half the sum of squared residuals before refinement. Points that cannot be projected
    /// are left out.
    pub initial_cost: f64,
    /// Half the sum of squared residuals after refinement, never above `initial_cost`.
    pub final_cost: f64,
}

/// Refines 3D points by minimizing their reprojection error in every camera that saw them.
///
/// The cameras are fixed, so the Jacobian is block diagonal by point and every point is an
/// independent three parameter least squares problem. Each one is minimized with
/// Levenberg-Marquardt, scaling parameters by the Jacobian column norms so points at very
/// different depths converge alike.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-serialize", serde(default))]
pub struct BundleAdjuster {
    patience: usize,
    ftol: f64,
    xtol: f64,
    gtol: f64,
    stepbound: f64,
}

impl BundleAdjuster {
    /// Creates a `BundleAdjuster` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the iteration budget of each point.
    ///
    /// A point may evaluate its residuals at most `patience * 4` times. Zero is treated as one.
    ///
    /// Default is `100`.
    #[must_use]
    pub fn patience(self, patience: usize) -> Self {
        Self { patience, ..self }
    }

    /// Set the tolerance on the relative reduction of the cost.
    ///
    /// Default is `1e-8`.
    #[must_use]
    pub fn ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }

    /// Set the tolerance on the step size relative to the size of the point.
    ///
    /// Default is `1e-8`.
    #[must_use]
    pub fn xtol(self, xtol: f64) -> Self {
        Self { xtol, ..self }
    }

    /// Set the tolerance on the cosine between the residuals and the Jacobian columns.
    ///
    /// Default is `1e-8`.
    #[must_use]
    pub fn gtol(self, gtol: f64) -> Self {
        Self { gtol, ..self }
    }

    /// Set the initial trust region radius, relative to the scaled point.
    ///
    /// Default is `100.0`.
    #[must_use]
    pub fn stepbound(self, stepbound: f64) -> Self {
        Self { stepbound, ..self }
    }

    fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_stepbound(self.stepbound)
            .with_patience(self.patience.max(1))
    }

    /// Refines the points of `problem`, holding `cameras` fixed.
    ///
    /// Fails only if the problem arrays are inconsistent. A point that cannot be projected or
    /// does not converge is not an error: it is reported in [`Refinement::outcomes`] and the
    /// refinement is [`RefinementStatus::Degraded`], while every other point is still refined.
    pub fn refine(&self, problem: &BundleAdjustmentProblem, cameras: &[CalibratedCamera]) -> Result<Refinement> {
        problem.validate(cameras.len())?;
        let solver = self.solver();

        let mut refinement = Refinement {
            points: Vec::with_capacity(problem.points.len()),
            status: RefinementStatus::Converged,
            outcomes: Vec::with_capacity(problem.points.len()),
            evaluations: 0,
            initial_cost: 0.0,
            final_cost: 0.0,
        };
        for (ix, block) in problem.sparsity().point_blocks().into_iter().enumerate() {
            let start = PointProblem {
                cameras,
                observations: block
                    .into_iter()
                    .map(|m| (problem.camera_index[m], problem.observations[m]))
                    .collect(),
                point: problem.points[ix].coords,
            };
            let point = refine_point(&solver, start);
            trace!("point {}: {:?} after {} evaluations", ix, point.outcome, point.evaluations);
            if point.outcome.status() == RefinementStatus::Degraded {
                refinement.status = RefinementStatus::Degraded;
            }
            if let Some((initial, last)) = point.costs {
                refinement.initial_cost += initial;
                refinement.final_cost += last;
            }
            refinement.evaluations += point.evaluations;
            refinement.points.push(Point3::from(point.point));
            refinement.outcomes.push(point.outcome);
        }

        let count = |outcome: PointOutcome| refinement.outcomes.iter().filter(|&&o| o == outcome).count();
        match refinement.status {
            RefinementStatus::Converged => debug!(
                "bundle adjustment converged for {} points: cost {} -> {}",
                refinement.points.len(),
                refinement.initial_cost,
                refinement.final_cost
            ),
            RefinementStatus::Degraded => warn!(
                "bundle adjustment degraded: {} points not projectable, {} stopped early, cost {} -> {}",
                count(PointOutcome::NotProjectable),
                count(PointOutcome::Stopped),
                refinement.initial_cost,
                refinement.final_cost
            ),
        }
        Ok(refinement)
    }
}

impl Default for BundleAdjuster {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            stepbound: 100.0,
        }
    }
}

struct PointRefinement {
    point: Vector3<f64>,
    outcome: PointOutcome,
    evaluations: usize,
    costs: Option<(f64, f64)>,
}

fn refine_point(solver: &LevenbergMarquardt<f64>, start: PointProblem<'_>) -> PointRefinement {
    let unchanged = |outcome, costs| PointRefinement {
        point: start.point,
        outcome,
        evaluations: 0,
        costs,
    };
    let initial_cost = match start.cost() {
        Some(cost) => cost,
        None => {
            debug!("point {:?} is behind a camera that observed it", start.point);
            return unchanged(PointOutcome::NotProjectable, None);
        }
    };
    if start.observations.len() < 2 {
        return unchanged(PointOutcome::Unconstrained, Some((initial_cost, initial_cost)));
    }

    let (solved, report) = solver.minimize(start.clone());
    let converged = matches!(
        report.termination,
        TerminationReason::ResidualsZero | TerminationReason::Orthogonal | TerminationReason::Converged { .. }
    );
    if !converged {
        debug!("point {:?} stopped: {:?}", start.point, report.termination);
    }
    let outcome = if converged {
        PointOutcome::Converged
    } else {
        PointOutcome::Stopped
    };
    // The last iterate may be a rejected trial step, keep the start unless it is better.
    match solved.cost().filter(|&cost| cost <= initial_cost) {
        Some(final_cost) => PointRefinement {
            point: solved.point,
            outcome,
            evaluations: report.number_of_evaluations,
            costs: Some((initial_cost, final_cost)),
        },
        None => PointRefinement {
            evaluations: report.number_of_evaluations,
            ..unchanged(PointOutcome::Stopped, Some((initial_cost, initial_cost)))
        },
    }
}

/// One point and the pixels that observed it.
#[derive(Clone)]
struct PointProblem<'a> {
    cameras: &'a [CalibratedCamera],
    /// `(camera, pixel)` pairs.
    observations: Vec<(usize, Point2<f64>)>,
    point: Vector3<f64>,
}

impl PointProblem<'_> {
    fn cost(&self) -> Option<f64> {
        self.residuals().map(|r| 0.5 * r.norm_squared())
    }
}

impl LeastSquaresProblem<f64, Dynamic, U3> for PointProblem<'_> {
    type ResidualStorage = VecStorage<f64, Dynamic, U1>;
    type JacobianStorage = VecStorage<f64, Dynamic, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, x: &Vector3<f64>) {
        self.point = *x;
    }

    fn params(&self) -> Vector3<f64> {
        self.point
    }

    /// Projection minus observation, two rows per observation.
    fn residuals(&self) -> Option<DVector<f64>> {
        let point = Point3::from(self.point);
        let mut residuals = DVector::zeros(2 * self.observations.len());
        for (m, &(camera, observed)) in self.observations.iter().enumerate() {
            let residual = self.cameras[camera].project(point)? - observed;
            residuals[2 * m] = residual.x;
            residuals[2 * m + 1] = residual.y;
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U3>> {
        let point = Point3::from(self.point);
        let mut jacobian = OMatrix::<f64, Dynamic, U3>::zeros(2 * self.observations.len());
        for (m, &(camera, _)) in self.observations.iter().enumerate() {
            let (_, block) = self.cameras[camera].project_with_jacobian(point)?;
            jacobian.fixed_rows_mut::<2>(2 * m).copy_from(&block);
        }
        Some(jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop3d_core::{nalgebra::Rotation3, CameraToWorld, Pose};
    use pop3d_pinhole::{BrownConrady, CameraIntrinsics};

    fn stereo() -> Vec<CalibratedCamera> {
        [0.0, 100.0]
            .iter()
            .map(|&x| {
                CalibratedCamera::new(
                    CameraIntrinsics::identity().focal(800.0),
                    BrownConrady::none(),
                    CameraToWorld::from_parts(Vector3::new(x, 0.0, 0.0), Rotation3::identity()),
                )
            })
            .collect()
    }

    fn observe(cameras: &[CalibratedCamera], point: Point3<f64>) -> Vec<Point2<f64>> {
        cameras.iter().map(|c| c.project(point).unwrap()).collect()
    }

    #[test]
    fn empty_problem_is_untouched() {
        let problem = BundleAdjustmentProblem::new(vec![Point3::new(1.0, 2.0, 3.0)], vec![], vec![], vec![]);
        let refinement = BundleAdjuster::new().refine(&problem, &stereo()).unwrap();
        assert_eq!(refinement.points, problem.points);
        assert_eq!(refinement.status, RefinementStatus::Converged);
        assert_eq!(refinement.outcomes, [PointOutcome::Unconstrained]);
        assert_eq!(refinement.evaluations, 0);
    }

    #[test]
    fn moves_point_onto_observations() {
        let cameras = stereo();
        let truth = Point3::new(20.0, -10.0, 400.0);
        let problem = BundleAdjustmentProblem::new(
            vec![Point3::new(26.0, -3.0, 380.0)],
            observe(&cameras, truth),
            vec![0, 0],
            vec![0, 1],
        );
        let refinement = BundleAdjuster::new().refine(&problem, &cameras).unwrap();
        assert_eq!(refinement.status, RefinementStatus::Converged);
        assert_eq!(refinement.outcomes, [PointOutcome::Converged]);
        assert!(refinement.final_cost < 1e-10, "final cost {}", refinement.final_cost);
        assert!((refinement.points[0] - truth).norm() < 1e-4);
    }

    #[test]
    fn exhausted_patience_degrades() {
        let cameras = stereo();
        let truth = Point3::new(20.0, -10.0, 400.0);
        let problem = BundleAdjustmentProblem::new(
            vec![Point3::new(60.0, 30.0, 300.0)],
            observe(&cameras, truth),
            vec![0, 0],
            vec![0, 1],
        );
        let refinement = BundleAdjuster::new()
            .patience(1)
            .ftol(f64::MIN_POSITIVE)
            .xtol(f64::MIN_POSITIVE)
            .gtol(f64::MIN_POSITIVE)
            .refine(&problem, &cameras)
            .unwrap();
        assert_eq!(refinement.status, RefinementStatus::Degraded);
        assert_eq!(refinement.outcomes, [PointOutcome::Stopped]);
        assert!(refinement.final_cost <= refinement.initial_cost);
    }

    #[test]
    fn point_behind_camera_does_not_block_the_others() {
        let cameras = stereo();
        let truth = Point3::new(20.0, -10.0, 400.0);
        let mut observations = observe(&cameras, truth);
        observations.extend([Point2::new(5.0, 5.0), Point2::new(-195.0, 5.0)]);
        let behind = Point3::new(0.0, 0.0, -50.0);
        let problem = BundleAdjustmentProblem::new(
            vec![Point3::new(26.0, -3.0, 380.0), behind],
            observations,
            vec![0, 0, 1, 1],
            vec![0, 1, 0, 1],
        );
        let refinement = BundleAdjuster::new().refine(&problem, &cameras).unwrap();
        assert_eq!(refinement.status, RefinementStatus::Degraded);
        assert_eq!(
            refinement.outcomes,
            [PointOutcome::Converged, PointOutcome::NotProjectable]
        );
        assert_eq!(refinement.points[1], behind);
        assert!((refinement.points[0] - truth).norm() < 1e-4);
        assert!(refinement.initial_cost.is_finite());
        assert!(refinement.final_cost < refinement.initial_cost);
    }
}
