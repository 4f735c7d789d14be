//! Single-camera calibration: closed-form initialisation followed by LM.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Iso3, Mat3, Observation, PinholeCamera, Real};
use stereo_linear::{dlt_homography, estimate_intrinsics_from_homographies, estimate_planar_pose_from_h};
use stereo_optim::{
    optimize_planar_intrinsics, IntrinsicsSolveOptions, SolveReport, SolveStatus,
};

use crate::error::{Stage, StereoError};

const MIN_VIEWS: usize = 2;

/// Result of [`IntrinsicCalibrator::calibrate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrinsicsCalibration {
    pub camera: PinholeCamera,
    /// `cam_from_board` per observation.
    pub poses: Vec<Iso3>,
    pub per_view_rms: Vec<Real>,
    /// `sqrt(Σ‖r‖² / N_points)` over every corner.
    pub rms: Real,
    pub status: SolveStatus,
    pub report: SolveReport,
}

/// Homographies of every view, board plane to pixels.
pub(crate) fn view_homographies(views: &[Observation], stage: Stage) -> Result<Vec<Mat3>, StereoError> {
    views
        .iter()
        .enumerate()
        .map(|(idx, view)| {
            dlt_homography(&view.planar_points(), &view.points_2d)
                .map_err(|e| StereoError::homography(stage, idx, e))
        })
        .collect()
}

/// Board poses from homographies for a known `K`.
pub(crate) fn poses_from_homographies(
    k: &Mat3,
    homographies: &[Mat3],
    stage: Stage,
) -> Result<Vec<Iso3>, StereoError> {
    homographies
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            estimate_planar_pose_from_h(k, h).map_err(|e| StereoError::pose_init(stage, idx, e))
        })
        .collect()
}

/// Zhang initialisation: distortion-free camera plus one pose per view.
pub fn initial_camera(
    views: &[Observation],
    image_size: ImageSize,
) -> Result<(PinholeCamera, Vec<Iso3>), StereoError> {
    let homographies = view_homographies(views, Stage::Intrinsics)?;
    let k = estimate_intrinsics_from_homographies(&homographies, image_size)
        .map_err(StereoError::intrinsics_init)?;
    let camera = PinholeCamera::ideal(k);
    let poses = poses_from_homographies(&camera.k_matrix(), &homographies, Stage::Intrinsics)?;
    Ok((camera, poses))
}

/// Calibrates one camera from checkerboard observations.
#[derive(Debug, Clone, Default)]
pub struct IntrinsicCalibrator {
    pub options: IntrinsicsSolveOptions,
}

impl IntrinsicCalibrator {
    pub fn new(options: IntrinsicsSolveOptions) -> Self {
        Self { options }
    }

    pub fn calibrate(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
    ) -> Result<IntrinsicsCalibration, StereoError> {
        if observations.len() < MIN_VIEWS {
            return Err(StereoError::InsufficientViews {
                stage: Stage::Intrinsics,
                required: MIN_VIEWS,
                got: observations.len(),
            });
        }
        let (init, init_poses) = initial_camera(observations, image_size)?;
        info!(
            "intrinsics init: fx={:.2} fy={:.2} cx={:.2} cy={:.2} from {} views",
            init.k.fx,
            init.k.fy,
            init.k.cx,
            init.k.cy,
            observations.len()
        );

        let est = optimize_planar_intrinsics(observations, &init, &init_poses, &self.options)
            .map_err(|e| StereoError::calibration(Stage::Intrinsics, e))?;
        if est.status == SolveStatus::DidNotConverge {
            warn!(
                "intrinsic refinement stopped after {} iterations without converging",
                est.report.iterations
            );
        }
        info!("intrinsics refined: rms={:.4} px", est.rms);

        Ok(IntrinsicsCalibration {
            camera: est.camera,
            poses: est.poses,
            per_view_rms: est.per_view_rms,
            rms: est.rms,
            status: est.status,
            report: est.report,
        })
    }
}
