//! Joint calibration of a camera pair.

use log::{debug, info, warn};
use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Iso3, Mat3, Observation, PinholeCamera, Pt2, Real, Vec3};
use stereo_linear::{dlt_homography, essential_from_pose, fundamental_from_essential};
use stereo_optim::{optimize_stereo, SolveReport, SolveStatus, StereoSolveOptions};

use crate::error::{Stage, StereoError};
use crate::intrinsics::poses_from_homographies;

const MIN_VIEWS: usize = 2;

/// Relative geometry of the pair, `X2 = R·X1 + T`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoGeometry {
    pub rotation: Mat3,
    pub translation: Vec3,
    /// `[T]ₓ·R`.
    pub essential: Mat3,
    /// `K2⁻ᵀ·E·K1⁻¹`, `‖F‖ = 1`.
    pub fundamental: Mat3,
}

impl StereoGeometry {
    pub fn from_pose(
        rotation: Mat3,
        translation: Vec3,
        camera1: &PinholeCamera,
        camera2: &PinholeCamera,
    ) -> Self {
        let essential = essential_from_pose(&rotation, &translation);
        let fundamental = fundamental_from_essential(&essential, &camera1.k, &camera2.k);
        Self {
            rotation,
            translation,
            essential,
            fundamental,
        }
    }

    /// `cam2_from_cam1` as an isometry.
    pub fn rig(&self) -> Iso3 {
        let rot = UnitQuaternion::from_matrix(&self.rotation);
        Iso3::from_parts(Translation3::from(self.translation), rot)
    }
}

/// Result of [`StereoCalibrator::calibrate_pair`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoCalibration {
    pub camera1: PinholeCamera,
    pub camera2: PinholeCamera,
    pub geometry: StereoGeometry,
    pub image_size: ImageSize,
    /// Board poses in camera 1.
    pub poses: Vec<Iso3>,
    /// Per view `(camera 1, camera 2)` RMS.
    pub per_view_rms: Vec<(Real, Real)>,
    /// RMS over the corners of both cameras.
    pub rms: Real,
    pub status: SolveStatus,
    pub report: SolveReport,
}

/// Calibrates the rig from paired observations and per-camera estimates.
#[derive(Debug, Clone, Default)]
pub struct StereoCalibrator {
    pub options: StereoSolveOptions,
}

pub(crate) fn check_pairs(
    obs1: &[Observation],
    obs2: &[Observation],
    stage: Stage,
) -> Result<(), StereoError> {
    let mismatch = |reason: String| StereoError::MismatchedObservationSets { stage, reason };
    if obs1.len() != obs2.len() {
        return Err(mismatch(format!(
            "{} views for camera 1, {} for camera 2",
            obs1.len(),
            obs2.len()
        )));
    }
    for (idx, (a, b)) in obs1.iter().zip(obs2).enumerate() {
        if a.len() != b.len() {
            return Err(mismatch(format!(
                "view {idx}: {} vs {} corners",
                a.len(),
                b.len()
            )));
        }
        if a.points_3d != b.points_3d {
            return Err(mismatch(format!("view {idx}: board points differ")));
        }
    }
    Ok(())
}

/// Every corner of the paired views, flattened in view order.
pub(crate) fn paired_corners(
    obs1: &[Observation],
    obs2: &[Observation],
    stage: Stage,
) -> Result<(Vec<Pt2>, Vec<Pt2>), StereoError> {
    check_pairs(obs1, obs2, stage)?;
    Ok(obs1
        .iter()
        .zip(obs2)
        .flat_map(|(a, b)| a.points_2d.iter().copied().zip(b.points_2d.iter().copied()))
        .unzip())
}

/// Per-view board poses for a calibrated camera.
///
/// Corners are undistorted first so the homography sees an ideal camera.
fn board_poses(camera: &PinholeCamera, views: &[Observation]) -> Result<Vec<Iso3>, StereoError> {
    let homographies = views
        .iter()
        .enumerate()
        .map(|(idx, v)| {
            dlt_homography(&v.planar_points(), &camera.undistort_pixels(&v.points_2d))
                .map_err(|e| StereoError::homography(Stage::Stereo, idx, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    poses_from_homographies(&camera.k_matrix(), &homographies, Stage::Stereo)
}

/// Robust rig guess from per-view relative poses.
///
/// The rotation is the medoid under geodesic distance, the translation the
/// per-axis median.
pub(crate) fn median_relative_pose(relative: &[Iso3]) -> Option<Iso3> {
    if relative.is_empty() {
        return None;
    }
    let medoid = relative
        .iter()
        .map(|a| {
            let cost: Real = relative.iter().map(|b| a.rotation.angle_to(&b.rotation)).sum();
            (cost, a.rotation)
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, r)| r)?;

    let median = |axis: usize| {
        let mut v: Vec<Real> = relative.iter().map(|p| p.translation.vector[axis]).collect();
        v.sort_by(|a, b| a.total_cmp(b));
        let n = v.len();
        if n % 2 == 1 {
            v[n / 2]
        } else {
            0.5 * (v[n / 2 - 1] + v[n / 2])
        }
    };
    let t = Vec3::new(median(0), median(1), median(2));
    Some(Iso3::from_parts(Translation3::from(t), medoid))
}

impl StereoCalibrator {
    pub fn new(options: StereoSolveOptions) -> Self {
        Self { options }
    }

    /// `observations1[i]` and `observations2[i]` must show the same board pose.
    pub fn calibrate_pair(
        &self,
        observations1: &[Observation],
        observations2: &[Observation],
        camera1: &PinholeCamera,
        camera2: &PinholeCamera,
        image_size: ImageSize,
    ) -> Result<StereoCalibration, StereoError> {
        check_pairs(observations1, observations2, Stage::Stereo)?;
        if observations1.len() < MIN_VIEWS {
            return Err(StereoError::InsufficientViews {
                stage: Stage::Stereo,
                required: MIN_VIEWS,
                got: observations1.len(),
            });
        }

        let poses1 = board_poses(camera1, observations1)?;
        let poses2 = board_poses(camera2, observations2)?;
        let relative: Vec<Iso3> = poses1
            .iter()
            .zip(&poses2)
            .map(|(p1, p2)| p2 * p1.inverse())
            .collect();
        let init_rig = median_relative_pose(&relative)
            .ok_or_else(|| StereoError::degenerate(Stage::Stereo, "no relative poses"))?;
        debug!(
            "stereo init: T=({:.4}, {:.4}, {:.4}) angle={:.4} rad",
            init_rig.translation.vector.x,
            init_rig.translation.vector.y,
            init_rig.translation.vector.z,
            init_rig.rotation.angle()
        );

        let est = optimize_stereo(
            observations1,
            observations2,
            camera1,
            camera2,
            &init_rig,
            &poses1,
            &self.options,
        )
        .map_err(|e| StereoError::calibration(Stage::Stereo, e))?;
        if est.status == SolveStatus::DidNotConverge {
            warn!(
                "stereo refinement stopped after {} iterations without converging",
                est.report.iterations
            );
        }

        let geometry = StereoGeometry::from_pose(
            est.rotation(),
            est.translation(),
            &est.camera1,
            &est.camera2,
        );
        info!(
            "stereo calibrated: |T|={:.4} rms={:.4} px",
            geometry.translation.norm(),
            est.rms
        );

        Ok(StereoCalibration {
            camera1: est.camera1,
            camera2: est.camera2,
            geometry,
            image_size,
            poses: est.poses,
            per_view_rms: est.per_view_rms,
            rms: est.rms,
            status: est.status,
            report: est.report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn iso(angle_y: Real, t: [Real; 3]) -> Iso3 {
        Iso3::from_parts(
            Translation3::new(t[0], t[1], t[2]),
            UnitQuaternion::from_scaled_axis(Vector3::y() * angle_y),
        )
    }

    #[test]
    fn median_pose_ignores_an_outlier() {
        let rel = vec![
            iso(0.10, [-1.0, 0.0, 0.01]),
            iso(0.11, [-1.01, 0.0, 0.0]),
            iso(0.09, [-0.99, 0.01, 0.0]),
            iso(0.9, [3.0, 2.0, 1.0]),
            iso(0.10, [-1.0, -0.01, 0.0]),
        ];
        let m = median_relative_pose(&rel).unwrap();
        assert!((m.rotation.angle() - 0.10).abs() < 0.011);
        assert!((m.translation.vector.x + 1.0).abs() < 0.011);
        assert!(m.translation.vector.y.abs() < 0.011);
    }

    #[test]
    fn mismatched_sets_are_fatal() {
        let a = Observation::new(vec![], vec![]).unwrap();
        let err = StereoCalibrator::default()
            .calibrate_pair(
                &[a.clone(), a.clone()],
                &[a],
                &PinholeCamera::ideal(stereo_core::FxFyCxCySkew::new(1.0, 1.0, 0.0, 0.0)),
                &PinholeCamera::ideal(stereo_core::FxFyCxCySkew::new(1.0, 1.0, 0.0, 0.0)),
                ImageSize::new(10, 10),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StereoError::MismatchedObservationSets { .. }
        ));
    }
}
