//! Single-camera refinement: intrinsics, distortion and per-view board poses.

use crate::params::{decode_pose, pack_pose, CameraBlock, IntrinsicsMask, POSE_DIM};
use crate::problems::{reprojection_rms, view_reprojection_rms, view_residuals};
use crate::traits::fd_step;
use crate::{
    CalibrationError, LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport,
    SolveStatus,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use stereo_core::{Iso3, Observation, PinholeCamera, Real};

/// Minimum number of views for planar calibration.
pub const MIN_VIEWS: usize = 2;

/// Options for [`optimize_planar_intrinsics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsSolveOptions {
    pub solve: SolveOptions,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Keep `k3` at its initial value.
    pub fix_k3: bool,
}

/// Result of [`optimize_planar_intrinsics`].
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsEstimate {
    pub camera: PinholeCamera,
    /// `cam_from_board` for every view.
    pub poses: Vec<Iso3>,
    pub per_view_rms: Vec<Real>,
    pub rms: Real,
    pub report: SolveReport,
    pub status: SolveStatus,
}

/// Parameter layout: `[camera free slots][rvec, t per view]`.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    views: Vec<Observation>,
    block: CameraBlock,
    row_offsets: Vec<usize>,
    num_residuals: usize,
}

impl PlanarIntrinsicsProblem {
    pub fn new(views: Vec<Observation>, camera: &PinholeCamera, mask: IntrinsicsMask) -> Self {
        let mut row_offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for v in &views {
            row_offsets.push(rows);
            rows += 2 * v.len();
        }
        Self {
            block: CameraBlock::new(camera, mask),
            views,
            row_offsets,
            num_residuals: rows,
        }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.block.dim() + POSE_DIM * view
    }

    /// Pack the initial parameter vector.
    ///
    /// The camera values come from the camera passed to [`Self::new`].
    pub fn initial_params(&self, poses: &[Iso3]) -> DVector<Real> {
        let mut v = Vec::with_capacity(self.block.dim() + POSE_DIM * poses.len());
        self.block.pack(&mut v);
        for pose in poses {
            pack_pose(pose, &mut v);
        }
        DVector::from_vec(v)
    }

    pub fn decode(&self, x: &DVector<Real>) -> (PinholeCamera, Vec<Iso3>) {
        let camera = self.block.decode(x, 0, None);
        let poses = (0..self.num_views())
            .map(|i| decode_pose(x, self.pose_offset(i)))
            .collect();
        (camera, poses)
    }

    fn write_view(&self, camera: &PinholeCamera, pose: &Iso3, view: usize, out: &mut DVector<Real>) {
        let start = self.row_offsets[view];
        let len = 2 * self.views[view].len();
        view_residuals(
            camera,
            pose,
            &self.views[view],
            &mut out.as_mut_slice()[start..start + len],
        );
    }
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn num_params(&self) -> usize {
        self.block.dim() + POSE_DIM * self.num_views()
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let (camera, poses) = self.decode(x);
        let mut r = DVector::zeros(self.num_residuals);
        for (i, pose) in poses.iter().enumerate() {
            self.write_view(&camera, pose, i, &mut r);
        }
        r
    }

    /// Central differences; pose columns only re-evaluate their own view.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut j = DMatrix::zeros(self.num_residuals, x.len());
        let mut xp = x.clone();

        for k in 0..self.block.dim() {
            let h = fd_step(x[k]);
            xp[k] = x[k] + h;
            let r_plus = self.residuals(&xp);
            xp[k] = x[k] - h;
            let r_minus = self.residuals(&xp);
            xp[k] = x[k];
            j.set_column(k, &((r_plus - r_minus) / (2.0 * h)));
        }

        let camera = self.block.decode(x, 0, None);
        let mut r_plus = DVector::zeros(self.num_residuals);
        let mut r_minus = DVector::zeros(self.num_residuals);
        for view in 0..self.num_views() {
            let offset = self.pose_offset(view);
            let rows = self.row_offsets[view]..self.row_offsets[view] + 2 * self.views[view].len();
            for p in 0..POSE_DIM {
                let k = offset + p;
                let h = fd_step(x[k]);
                xp[k] = x[k] + h;
                self.write_view(&camera, &decode_pose(&xp, offset), view, &mut r_plus);
                xp[k] = x[k] - h;
                self.write_view(&camera, &decode_pose(&xp, offset), view, &mut r_minus);
                xp[k] = x[k];
                for row in rows.clone() {
                    j[(row, k)] = (r_plus[row] - r_minus[row]) / (2.0 * h);
                }
            }
        }
        j
    }
}

/// Refine a camera and its per-view board poses by minimizing reprojection error.
///
/// `init_poses[i]` is `cam_from_board` for `views[i]`. Hitting the iteration
/// cap returns the best parameters with [`SolveStatus::DidNotConverge`].
pub fn optimize_planar_intrinsics(
    views: &[Observation],
    init_camera: &PinholeCamera,
    init_poses: &[Iso3],
    opts: &IntrinsicsSolveOptions,
) -> Result<PlanarIntrinsicsEstimate, CalibrationError> {
    if views.len() < MIN_VIEWS {
        return Err(CalibrationError::InsufficientViews {
            required: MIN_VIEWS,
            got: views.len(),
        });
    }
    if init_poses.len() != views.len() {
        return Err(CalibrationError::MismatchedObservationSets(format!(
            "{} views but {} initial poses",
            views.len(),
            init_poses.len()
        )));
    }
    if let Some((i, v)) = views.iter().enumerate().find(|(_, v)| v.len() < 4) {
        return Err(CalibrationError::DegenerateGeometry(format!(
            "view {i} has {} points, need at least 4",
            v.len()
        )));
    }

    let mask = IntrinsicsMask {
        zero_tangent_dist: opts.zero_tangent_dist,
        fix_k3: opts.fix_k3,
        ..IntrinsicsMask::default()
    };
    let problem = PlanarIntrinsicsProblem::new(views.to_vec(), init_camera, mask);
    let x0 = problem.initial_params(init_poses);
    let (x, report) = LmBackend.solve(&problem, x0, &opts.solve);
    let (camera, poses) = problem.decode(&x);

    let per_view_rms = poses
        .iter()
        .zip(views)
        .map(|(pose, view)| view_reprojection_rms(&camera, pose, view))
        .collect();
    let rms = reprojection_rms(&camera, &poses, views);
    log::debug!(
        "intrinsics refinement: fx={:.3} fy={:.3} cx={:.3} cy={:.3} rms={rms:.4}",
        camera.k.fx,
        camera.k.fy,
        camera.k.cx,
        camera.k.cy
    );

    Ok(PlanarIntrinsicsEstimate {
        camera,
        poses,
        per_view_rms,
        rms,
        status: SolveStatus::from(&report),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::synthetic::planar;
    use stereo_core::{BrownConrady5, FxFyCxCySkew, PatternGeometry};

    fn setup() -> (PinholeCamera, Vec<Iso3>, Vec<Observation>) {
        let cam = PinholeCamera::new(
            FxFyCxCySkew::new(400.0, 395.0, 198.0, 152.0),
            BrownConrady5::from_coeffs([-0.12, 0.03, 0.0008, -0.0005, 0.0]),
        );
        let pattern = PatternGeometry::new(6, 9);
        let poses = planar::varied_board_poses(&pattern, 8, 22.0);
        let views = planar::project_views_all(&cam, &pattern.object_points(), &poses).unwrap();
        (cam, poses, views)
    }

    #[test]
    fn block_jacobian_matches_dense_finite_differences() {
        let (cam, poses, views) = setup();
        let problem = PlanarIntrinsicsProblem::new(views[..2].to_vec(), &cam, IntrinsicsMask::default());
        let x = problem.initial_params(&poses[..2]);

        struct Dense<'a>(&'a PlanarIntrinsicsProblem);
        impl NllsProblem for Dense<'_> {
            fn num_params(&self) -> usize {
                self.0.num_params()
            }
            fn num_residuals(&self) -> usize {
                self.0.num_residuals()
            }
            fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
                self.0.residuals(x)
            }
        }

        let j_block = problem.jacobian(&x);
        let j_dense = Dense(&problem).jacobian(&x);
        assert!((j_block - j_dense).abs().max() < 1e-6);
    }

    #[test]
    fn recovers_perturbed_camera() {
        let (cam_gt, poses, views) = setup();
        let init = PinholeCamera::ideal(FxFyCxCySkew::new(380.0, 380.0, 200.0, 150.0));
        let perturbed: Vec<Iso3> = poses
            .iter()
            .map(|p| {
                let mut q = *p;
                q.translation.vector.z += 0.3;
                q
            })
            .collect();

        let est = optimize_planar_intrinsics(&views, &init, &perturbed, &IntrinsicsSolveOptions::default())
            .unwrap();

        assert_eq!(est.status, SolveStatus::Converged);
        assert!(est.rms < 1e-6, "rms {}", est.rms);
        assert!((est.camera.k.fx - cam_gt.k.fx).abs() < 1e-4);
        assert!((est.camera.k.fy - cam_gt.k.fy).abs() < 1e-4);
        assert!((est.camera.k.cx - cam_gt.k.cx).abs() < 1e-4);
        assert!((est.camera.dist.k1 - cam_gt.dist.k1).abs() < 1e-5);
        assert_eq!(est.per_view_rms.len(), 8);
    }

    #[test]
    fn single_view_is_insufficient() {
        let (cam, poses, views) = setup();
        let err = optimize_planar_intrinsics(&views[..1], &cam, &poses[..1], &IntrinsicsSolveOptions::default());
        assert!(matches!(
            err,
            Err(CalibrationError::InsufficientViews { required: 2, got: 1 })
        ));
    }
}
