//! Reconstruction of whole frames, one set of per-camera feature maps at a time.

use crate::Pop3dSettings;
use log::*;
use pop3d_core::{Error, ImageFeatures, Result, SpaceFeatures};
use pop3d_geom::select_best_pair;
use pop3d_optimize::{BundleAdjustmentProblem, RefinementStatus};
use pop3d_pinhole::CalibratedCamera;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The reconstruction of a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// Every feature observed by at least two cameras, in world space.
    pub points: SpaceFeatures,
    /// [`RefinementStatus::Degraded`] when bundle adjustment left a point unprojectable or stopped
    /// before converging.
    pub status: RefinementStatus,
    /// First camera of the pair of views sharing the most features.
    pub reference_camera: usize,
    /// Features that were seen by fewer than two cameras.
    pub skipped: Vec<String>,
}

impl FrameResult {
    pub fn features_skipped(&self) -> usize {
        self.skipped.len()
    }
}

/// The outcome of [`FramePipeline::process_batch`].
///
/// `results[i]` belongs to the `i`-th input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub results: Vec<Result<FrameResult>>,
    pub frames_ok: usize,
    pub frames_failed: usize,
    /// Frames that succeeded, but whose refinement was degraded.
    pub frames_degraded: usize,
    pub features_skipped: usize,
}

impl BatchReport {
    fn new(results: Vec<Result<FrameResult>>) -> Self {
        let mut report = Self {
            results: vec![],
            frames_ok: 0,
            frames_failed: 0,
            frames_degraded: 0,
            features_skipped: 0,
        };
        for (frame, result) in results.iter().enumerate() {
            match result {
                Ok(result) => {
                    report.frames_ok += 1;
                    report.features_skipped += result.features_skipped();
                    if result.status == RefinementStatus::Degraded {
                        report.frames_degraded += 1;
                    }
                }
                Err(e) => {
                    warn!("skipping frame {}: {}", frame, e);
                    report.frames_failed += 1;
                }
            }
        }
        report.results = results;
        report
    }

    /// The successful frames, in input order.
    pub fn successful(&self) -> impl Iterator<Item = &FrameResult> + '_ {
        self.results.iter().filter_map(|result| result.as_ref().ok())
    }
}

/// Reconstructs frames observed by a fixed, calibrated rig.
///
/// Each feature is triangulated from the first two cameras that observed it. When enabled,
/// bundle adjustment then refines every point against all of its observations.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePipeline {
    pub cameras: Vec<CalibratedCamera>,
    pub settings: Pop3dSettings,
}

impl FramePipeline {
    pub fn new(cameras: Vec<CalibratedCamera>) -> Self {
        Self::with_settings(cameras, Pop3dSettings::default())
    }

    pub fn with_settings(cameras: Vec<CalibratedCamera>, settings: Pop3dSettings) -> Self {
        Self { cameras, settings }
    }

    /// Reconstructs one frame. `maps[i]` holds the pixels seen by camera `i`.
    pub fn process(&self, maps: &[ImageFeatures]) -> Result<FrameResult> {
        if self.cameras.len() != maps.len() {
            return Err(Error::MismatchedLengths(self.cameras.len(), maps.len()));
        }
        let (reference_camera, _) = select_best_pair(maps).ok_or(Error::InsufficientViews {
            actual: maps.len(),
        })?;
        let initial = self
            .settings
            .triangulator()
            .initial_triangulation(&self.cameras, maps)?;
        if !initial.skipped.is_empty() {
            debug!(
                "{} features seen by fewer than two cameras: {:?}",
                initial.skipped.len(),
                initial.skipped
            );
        }

        let (points, status) = if self.settings.refine && !initial.points.is_empty() {
            let problem = BundleAdjustmentProblem::from_feature_maps(maps, &initial.points);
            let refinement = self
                .settings
                .bundle_adjustment
                .refine(&problem, &self.cameras)?;
            (problem.to_features(&refinement.points), refinement.status)
        } else {
            (initial.points, RefinementStatus::Converged)
        };
        info!(
            "reconstructed {} features ({} skipped, {:?})",
            points.len(),
            initial.skipped.len(),
            status
        );

        Ok(FrameResult {
            points,
            status,
            reference_camera,
            skipped: initial.skipped,
        })
    }

    /// Reconstructs every frame, carrying on past frames that fail.
    pub fn process_batch(&self, frames: &[Vec<ImageFeatures>]) -> BatchReport {
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = frames.iter().map(|maps| self.process(maps)).collect();
        #[cfg(feature = "rayon")]
        let results: Vec<_> = frames.par_iter().map(|maps| self.process(maps)).collect();

        let report = BatchReport::new(results);
        info!(
            "processed {} frames: {} ok, {} failed, {} degraded",
            frames.len(),
            report.frames_ok,
            report.frames_failed,
            report.frames_degraded
        );
        report
    }

    /// Robustly averages the points of several frames of a static scene.
    pub fn average<'a>(&self, frames: impl IntoIterator<Item = &'a FrameResult>) -> SpaceFeatures {
        self.settings
            .trimmed_mean()
            .average_features(frames.into_iter().map(|frame| &frame.points))
    }
}
