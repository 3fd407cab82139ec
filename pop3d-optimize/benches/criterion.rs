use criterion::{criterion_group, criterion_main, Criterion};
use pop3d_core::{
    nalgebra::{Point2, Point3, Rotation3, Vector2, Vector3},
    CameraToWorld, ImageFeatures, Pose, SpaceFeatures,
};
use pop3d_optimize::{BundleAdjuster, BundleAdjustmentProblem};
use pop3d_pinhole::{BrownConrady, CalibratedCamera, CameraIntrinsics};

fn rig() -> Vec<CalibratedCamera> {
    (0..4)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::FRAC_PI_2;
            let center = Vector3::new(3000.0 * angle.cos(), 3000.0 * angle.sin(), 1500.0);
            CalibratedCamera::new(
                CameraIntrinsics::identity()
                    .focals(Vector2::new(1800.0, 1800.0))
                    .principal_point(Point2::new(1920.0, 1080.0)),
                BrownConrady::from_coefficients(&[-0.1, 0.04, 0.001, 0.001, 0.0]).unwrap(),
                CameraToWorld::from_parts(
                    center,
                    Rotation3::face_towards(&-center, &Vector3::new(0.0, 0.0, -1.0)),
                ),
            )
        })
        .collect()
}

fn problem(cameras: &[CalibratedCamera], features: usize) -> BundleAdjustmentProblem {
    let truth: SpaceFeatures = (0..features)
        .map(|i| {
            let t = i as f64;
            (
                format!("f{}", i),
                Point3::new(200.0 * (t * 0.7).sin(), 200.0 * (t * 1.3).cos(), 100.0 + 50.0 * (t * 0.4).sin()),
            )
        })
        .collect();
    let maps: Vec<ImageFeatures> = cameras.iter().map(|c| c.project_features(&truth)).collect();
    let initial: SpaceFeatures = truth
        .iter()
        .map(|(name, p)| (name.clone(), p + Vector3::new(4.0, -3.0, 5.0)))
        .collect();
    BundleAdjustmentProblem::from_feature_maps(&maps, &initial)
}

fn refine(c: &mut Criterion) {
    let cameras = rig();
    let adjuster = BundleAdjuster::new();
    for features in [16, 256] {
        let problem = problem(&cameras, features);
        c.bench_function(&format!("refine_{}_features", features), |b| {
            b.iter(|| adjuster.refine(&problem, &cameras).unwrap())
        });
    }
}

criterion_group!(
    name = bundle_adjustment;
    config = Criterion::default().sample_size(10);
    targets = refine
);
criterion_main!(bundle_adjustment);
