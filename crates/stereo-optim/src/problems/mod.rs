//! Calibration problems built on [`crate::NllsProblem`].

pub mod planar_intrinsics;
pub mod stereo;

use stereo_core::{Iso3, Observation, PinholeCamera, Real};

/// Residual assigned per axis to a board point behind the camera.
const BEHIND_CAMERA_PENALTY: Real = 1e3;

/// Write `observed - projected` for every point of `view` into `out`.
pub(crate) fn view_residuals(
    camera: &PinholeCamera,
    cam_from_board: &Iso3,
    view: &Observation,
    out: &mut [Real],
) {
    debug_assert_eq!(out.len(), 2 * view.len());
    for (j, (pw, meas)) in view.points_3d.iter().zip(&view.points_2d).enumerate() {
        let pc = cam_from_board.transform_point(pw);
        match camera.project_point(&pc) {
            Some(proj) => {
                out[2 * j] = meas.x - proj.x;
                out[2 * j + 1] = meas.y - proj.y;
            }
            None => {
                out[2 * j] = BEHIND_CAMERA_PENALTY;
                out[2 * j + 1] = BEHIND_CAMERA_PENALTY;
            }
        }
    }
}

/// Sum of squared reprojection distances and the number of points.
pub(crate) fn view_sum_squared(camera: &PinholeCamera, pose: &Iso3, view: &Observation) -> (Real, usize) {
    let mut r = vec![0.0; 2 * view.len()];
    view_residuals(camera, pose, view, &mut r);
    (r.iter().map(|v| v * v).sum(), view.len())
}

/// RMS reprojection error of one view: `sqrt(Σ‖e‖² / N)`.
pub fn view_reprojection_rms(camera: &PinholeCamera, pose: &Iso3, view: &Observation) -> Real {
    let (sum, n) = view_sum_squared(camera, pose, view);
    if n == 0 {
        0.0
    } else {
        (sum / n as Real).sqrt()
    }
}

/// RMS reprojection error over all points of all views.
pub fn reprojection_rms(camera: &PinholeCamera, poses: &[Iso3], views: &[Observation]) -> Real {
    let (sum, n) = poses
        .iter()
        .zip(views)
        .map(|(pose, view)| view_sum_squared(camera, pose, view))
        .fold((0.0, 0usize), |(s, c), (vs, vc)| (s + vs, c + vc));
    if n == 0 {
        0.0
    } else {
        (sum / n as Real).sqrt()
    }
}
