use nalgebra::{Translation3, UnitQuaternion, Vector3};
use stereo_core::synthetic::{noise::UniformPixelNoise, planar};
use stereo_core::{BrownConrady5, FxFyCxCySkew, Iso3, PatternGeometry, PinholeCamera};
use stereo_optim::{optimize_stereo, SolveStatus, StereoSolveOptions};

fn rig_gt() -> Iso3 {
    Iso3::from_parts(
        Translation3::new(-2.0, 0.04, 0.03),
        UnitQuaternion::from_scaled_axis(Vector3::new(0.01, -0.03, 0.005)),
    )
}

fn perturb(pose: &Iso3, k: usize) -> Iso3 {
    let dr = UnitQuaternion::from_scaled_axis(Vector3::new(0.01, -0.008, 0.005) * (1.0 + k as f64 * 0.1));
    Iso3::from_parts(
        Translation3::from(pose.translation.vector + Vector3::new(0.05, -0.05, 0.2)),
        dr * pose.rotation,
    )
}

#[test]
fn stereo_refinement_recovers_rig() {
    let k = FxFyCxCySkew::new(400.0, 400.0, 200.0, 150.0);
    let cam1 = PinholeCamera::new(k, BrownConrady5::from_coeffs([-0.08, 0.01, 0.0, 0.0, 0.0]));
    let cam2 = PinholeCamera::new(
        FxFyCxCySkew::new(400.0, 400.0, 204.0, 147.0),
        BrownConrady5::from_coeffs([-0.05, 0.005, 0.0, 0.0, 0.0]),
    );
    let pattern = PatternGeometry::new(6, 9);
    let poses = planar::varied_board_poses(&pattern, 10, 22.0);
    let (v1, v2) =
        planar::project_stereo_views(&cam1, &cam2, &rig_gt(), &pattern.object_points(), &poses).unwrap();

    let init_rig = Iso3::from_parts(
        Translation3::new(-1.8, 0.0, 0.0),
        UnitQuaternion::identity(),
    );
    let init_poses: Vec<Iso3> = poses.iter().enumerate().map(|(i, p)| perturb(p, i)).collect();
    let init1 = PinholeCamera::ideal(FxFyCxCySkew::new(390.0, 392.0, 198.0, 151.0));
    let init2 = PinholeCamera::ideal(FxFyCxCySkew::new(390.0, 392.0, 203.0, 148.0));

    let est = optimize_stereo(&v1, &v2, &init1, &init2, &init_rig, &init_poses, &StereoSolveOptions::default())
        .unwrap();

    assert_eq!(est.status, SolveStatus::Converged);
    assert!(est.rms < 1e-6, "rms {}", est.rms);
    assert!((est.translation() - rig_gt().translation.vector).norm() < 1e-6);
    assert!(est.rig.rotation.angle_to(&rig_gt().rotation) < 1e-8);
    assert_eq!(est.camera1.k.fx, est.camera2.k.fx);
    assert!((est.camera2.k.cx - 204.0).abs() < 1e-4);
    assert_eq!(est.per_view_rms.len(), 10);
}

#[test]
fn noisy_observations_keep_rms_near_noise_level() {
    let cam = PinholeCamera::ideal(FxFyCxCySkew::new(400.0, 400.0, 200.0, 150.0));
    let pattern = PatternGeometry::new(6, 9);
    let poses = planar::varied_board_poses(&pattern, 8, 22.0);
    let (mut v1, mut v2) =
        planar::project_stereo_views(&cam, &cam, &rig_gt(), &pattern.object_points(), &poses).unwrap();
    UniformPixelNoise::new(1, 0.2).apply(&mut v1);
    UniformPixelNoise::new(2, 0.2).apply(&mut v2);

    let opts = StereoSolveOptions {
        fix_intrinsics: true,
        ..StereoSolveOptions::default()
    };
    let est = optimize_stereo(&v1, &v2, &cam, &cam, &rig_gt(), &poses, &opts).unwrap();

    // Uniform noise in [-0.2, 0.2] per axis has an RMS of about 0.16 px per point.
    assert!(est.rms < 0.2, "rms {}", est.rms);
    assert!((est.translation() - rig_gt().translation.vector).norm() < 0.05);
    assert_eq!(est.camera1, cam);
}

#[test]
fn fixed_intrinsics_survive_default_tangential_flag() {
    let cam = PinholeCamera::new(
        FxFyCxCySkew::new(400.0, 400.0, 200.0, 150.0),
        BrownConrady5::from_coeffs([-0.05, 0.01, 0.002, -0.0015, 0.0]),
    );
    let pattern = PatternGeometry::new(6, 9);
    let poses = planar::varied_board_poses(&pattern, 6, 22.0);
    let (v1, v2) =
        planar::project_stereo_views(&cam, &cam, &rig_gt(), &pattern.object_points(), &poses).unwrap();

    let opts = StereoSolveOptions {
        fix_intrinsics: true,
        ..StereoSolveOptions::default()
    };
    assert!(opts.zero_tangent_dist);
    let est = optimize_stereo(&v1, &v2, &cam, &cam, &rig_gt(), &poses, &opts).unwrap();

    assert_eq!(est.camera1, cam);
    assert_eq!(est.camera2, cam);
    assert!(est.rms < 1e-6, "rms {}", est.rms);
}
