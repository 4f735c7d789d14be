//! Joint refinement of a two-camera rig.
//!
//! Unknowns: both cameras (subject to [`StereoSolveOptions`]), the rig
//! transform `cam2_from_cam1` (`X2 = R·X1 + T`) and every view's board pose
//! in camera 1. Residuals are the reprojection errors of both cameras.

use crate::params::{decode_pose, pack_pose, CameraBlock, IntrinsicsMask, POSE_DIM};
use crate::problems::{view_residuals, view_reprojection_rms, view_sum_squared};
use crate::traits::fd_step;
use crate::{
    CalibrationError, LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport,
    SolveStatus,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use stereo_core::{Iso3, Mat3, Observation, PinholeCamera, Real, Vec3};

/// Minimum number of view pairs for stereo calibration.
pub const MIN_VIEWS: usize = 2;

/// Options for [`optimize_stereo`].
///
/// The defaults match a classic stereo calibration call with a shared focal
/// length and zero tangential distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoSolveOptions {
    pub solve: SolveOptions,
    /// Keep both cameras fixed and solve only for the rig and board poses.
    pub fix_intrinsics: bool,
    /// Camera 2 uses camera 1's `fx, fy`.
    pub same_focal_length: bool,
    /// Force `p1 = p2 = 0` on both cameras.
    pub zero_tangent_dist: bool,
    /// Keep `k3` at its initial value on both cameras.
    pub fix_k3: bool,
}

impl Default for StereoSolveOptions {
    fn default() -> Self {
        Self {
            solve: SolveOptions::default(),
            fix_intrinsics: false,
            same_focal_length: true,
            zero_tangent_dist: true,
            fix_k3: false,
        }
    }
}

/// Result of [`optimize_stereo`].
#[derive(Debug, Clone)]
pub struct StereoEstimate {
    pub camera1: PinholeCamera,
    pub camera2: PinholeCamera,
    /// `cam2_from_cam1`.
    pub rig: Iso3,
    /// Board poses in camera 1.
    pub poses: Vec<Iso3>,
    /// Per-view RMS for (camera 1, camera 2).
    pub per_view_rms: Vec<(Real, Real)>,
    /// RMS over every corner of both cameras.
    pub rms: Real,
    pub report: SolveReport,
    pub status: SolveStatus,
}

impl StereoEstimate {
    pub fn rotation(&self) -> Mat3 {
        self.rig.rotation.to_rotation_matrix().into_inner()
    }

    pub fn translation(&self) -> Vec3 {
        self.rig.translation.vector
    }
}

/// Parameter layout: `[cam1][cam2][rig rvec, t][rvec, t per view]`.
#[derive(Debug, Clone)]
pub struct StereoProblem {
    views1: Vec<Observation>,
    views2: Vec<Observation>,
    block1: CameraBlock,
    block2: CameraBlock,
    share_focal: bool,
    row_offsets: Vec<usize>,
    cam2_rows: usize,
    num_residuals: usize,
}

impl StereoProblem {
    pub fn new(
        views1: Vec<Observation>,
        views2: Vec<Observation>,
        camera1: &PinholeCamera,
        camera2: &PinholeCamera,
        opts: &StereoSolveOptions,
    ) -> Self {
        let mask = IntrinsicsMask {
            fix_intrinsics: opts.fix_intrinsics,
            zero_tangent_dist: opts.zero_tangent_dist,
            fix_k3: opts.fix_k3,
            borrow_focal: false,
        };
        let share_focal = opts.same_focal_length && !opts.fix_intrinsics;
        let mask2 = IntrinsicsMask {
            borrow_focal: share_focal,
            ..mask
        };

        let mut row_offsets = Vec::with_capacity(views1.len());
        let mut rows = 0;
        for v in &views1 {
            row_offsets.push(rows);
            rows += 2 * v.len();
        }
        let cam2_rows = rows;

        Self {
            block1: CameraBlock::new(camera1, mask),
            block2: CameraBlock::new(camera2, mask2),
            share_focal,
            views1,
            views2,
            row_offsets,
            cam2_rows,
            num_residuals: 2 * cam2_rows,
        }
    }

    pub fn num_views(&self) -> usize {
        self.views1.len()
    }

    fn rig_offset(&self) -> usize {
        self.block1.dim() + self.block2.dim()
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.rig_offset() + POSE_DIM * (view + 1)
    }

    pub fn initial_params(&self, rig: &Iso3, poses: &[Iso3]) -> DVector<Real> {
        let mut v = Vec::with_capacity(self.pose_offset(poses.len()));
        self.block1.pack(&mut v);
        self.block2.pack(&mut v);
        pack_pose(rig, &mut v);
        for pose in poses {
            pack_pose(pose, &mut v);
        }
        DVector::from_vec(v)
    }

    fn decode_cameras(&self, x: &DVector<Real>) -> (PinholeCamera, PinholeCamera) {
        let camera1 = self.block1.decode(x, 0, None);
        let focal = self.share_focal.then_some((camera1.k.fx, camera1.k.fy));
        let camera2 = self.block2.decode(x, self.block1.dim(), focal);
        (camera1, camera2)
    }

    /// Cameras, rig transform and board poses encoded in `x`.
    pub fn decode(&self, x: &DVector<Real>) -> (PinholeCamera, PinholeCamera, Iso3, Vec<Iso3>) {
        let (camera1, camera2) = self.decode_cameras(x);
        let rig = decode_pose(x, self.rig_offset());
        let poses = (0..self.num_views())
            .map(|i| decode_pose(x, self.pose_offset(i)))
            .collect();
        (camera1, camera2, rig, poses)
    }

    fn write_view(
        &self,
        camera1: &PinholeCamera,
        camera2: &PinholeCamera,
        rig: &Iso3,
        pose: &Iso3,
        view: usize,
        out: &mut DVector<Real>,
    ) {
        let start = self.row_offsets[view];
        let len = 2 * self.views1[view].len();
        let slice = out.as_mut_slice();
        view_residuals(camera1, pose, &self.views1[view], &mut slice[start..start + len]);
        let start2 = self.cam2_rows + start;
        view_residuals(
            camera2,
            &(rig * pose),
            &self.views2[view],
            &mut slice[start2..start2 + len],
        );
    }
}

impl NllsProblem for StereoProblem {
    fn num_params(&self) -> usize {
        self.pose_offset(self.num_views())
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let (camera1, camera2, rig, poses) = self.decode(x);
        let mut r = DVector::zeros(self.num_residuals);
        for (i, pose) in poses.iter().enumerate() {
            self.write_view(&camera1, &camera2, &rig, pose, i, &mut r);
        }
        r
    }

    /// Central differences; board-pose columns only re-evaluate their view.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut j = DMatrix::zeros(self.num_residuals, x.len());
        let mut xp = x.clone();

        // Cameras and rig touch many rows: full re-evaluation.
        for k in 0..self.pose_offset(0) {
            let h = fd_step(x[k]);
            xp[k] = x[k] + h;
            let r_plus = self.residuals(&xp);
            xp[k] = x[k] - h;
            let r_minus = self.residuals(&xp);
            xp[k] = x[k];
            j.set_column(k, &((r_plus - r_minus) / (2.0 * h)));
        }

        let (camera1, camera2) = self.decode_cameras(x);
        let rig = decode_pose(x, self.rig_offset());
        let mut r_plus = DVector::zeros(self.num_residuals);
        let mut r_minus = DVector::zeros(self.num_residuals);
        for view in 0..self.num_views() {
            let offset = self.pose_offset(view);
            let start = self.row_offsets[view];
            let len = 2 * self.views1[view].len();
            for p in 0..POSE_DIM {
                let k = offset + p;
                let h = fd_step(x[k]);
                xp[k] = x[k] + h;
                self.write_view(&camera1, &camera2, &rig, &decode_pose(&xp, offset), view, &mut r_plus);
                xp[k] = x[k] - h;
                self.write_view(&camera1, &camera2, &rig, &decode_pose(&xp, offset), view, &mut r_minus);
                xp[k] = x[k];
                for row in (start..start + len).chain(self.cam2_rows + start..self.cam2_rows + start + len) {
                    j[(row, k)] = (r_plus[row] - r_minus[row]) / (2.0 * h);
                }
            }
        }
        j
    }
}

fn check_observation_sets(views1: &[Observation], views2: &[Observation]) -> Result<(), CalibrationError> {
    if views1.len() != views2.len() {
        return Err(CalibrationError::MismatchedObservationSets(format!(
            "{} views for camera 1, {} for camera 2",
            views1.len(),
            views2.len()
        )));
    }
    for (i, (v1, v2)) in views1.iter().zip(views2).enumerate() {
        if v1.len() != v2.len() {
            return Err(CalibrationError::MismatchedObservationSets(format!(
                "view {i}: {} corners vs {}",
                v1.len(),
                v2.len()
            )));
        }
        if v1.points_3d != v2.points_3d {
            return Err(CalibrationError::MismatchedObservationSets(format!(
                "view {i}: board points differ between cameras"
            )));
        }
    }
    Ok(())
}

/// Jointly refine both cameras, the rig transform and the board poses.
///
/// `init_rig` is `cam2_from_cam1`; `init_poses[i]` is camera 1's
/// `cam_from_board` for view `i`.
pub fn optimize_stereo(
    views1: &[Observation],
    views2: &[Observation],
    camera1: &PinholeCamera,
    camera2: &PinholeCamera,
    init_rig: &Iso3,
    init_poses: &[Iso3],
    opts: &StereoSolveOptions,
) -> Result<StereoEstimate, CalibrationError> {
    check_observation_sets(views1, views2)?;
    if views1.len() < MIN_VIEWS {
        return Err(CalibrationError::InsufficientViews {
            required: MIN_VIEWS,
            got: views1.len(),
        });
    }
    if init_poses.len() != views1.len() {
        return Err(CalibrationError::MismatchedObservationSets(format!(
            "{} views but {} initial poses",
            views1.len(),
            init_poses.len()
        )));
    }

    let problem = StereoProblem::new(views1.to_vec(), views2.to_vec(), camera1, camera2, opts);
    let x0 = problem.initial_params(init_rig, init_poses);
    let (x, report) = LmBackend.solve(&problem, x0, &opts.solve);
    let (camera1, camera2, rig, poses) = problem.decode(&x);

    let mut sum = 0.0;
    let mut count = 0usize;
    let mut per_view_rms = Vec::with_capacity(poses.len());
    for ((pose, v1), v2) in poses.iter().zip(views1).zip(views2) {
        let pose2 = rig * pose;
        let (s1, n1) = view_sum_squared(&camera1, pose, v1);
        let (s2, n2) = view_sum_squared(&camera2, &pose2, v2);
        sum += s1 + s2;
        count += n1 + n2;
        per_view_rms.push((
            view_reprojection_rms(&camera1, pose, v1),
            view_reprojection_rms(&camera2, &pose2, v2),
        ));
    }
    let rms = if count > 0 { (sum / count as Real).sqrt() } else { 0.0 };
    log::debug!(
        "stereo refinement: |T|={:.5} angle={:.5} rad rms={rms:.4}",
        rig.translation.vector.norm(),
        rig.rotation.angle()
    );

    Ok(StereoEstimate {
        camera1,
        camera2,
        rig,
        poses,
        per_view_rms,
        rms,
        status: SolveStatus::from(&report),
        report,
    })
}
