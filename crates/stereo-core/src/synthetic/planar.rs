//! Synthetic planar target helpers.
//!
//! Pose generators keep the board in front of the camera while varying the
//! viewpoint, and the projection helpers turn board points into
//! [`crate::Observation`] instances for one camera or a stereo rig.

use crate::{Iso3, Observation, PatternGeometry, PinholeCamera, Pt3, Real};
use anyhow::Result;
use nalgebra::{Translation3, UnitQuaternion, Vector3};

/// Board center in its own frame.
pub fn board_center(pattern: &PatternGeometry) -> Pt3 {
    Pt3::new(
        0.5 * (pattern.board_width.saturating_sub(1)) as Real * pattern.square_size,
        0.5 * (pattern.board_height.saturating_sub(1)) as Real * pattern.square_size,
        0.0,
    )
}

/// Pose (`cam_from_board`) placing the board center at `center_c` with the
/// given roll/pitch/yaw tilt.
pub fn board_pose_looking_at(
    pattern: &PatternGeometry,
    center_c: Pt3,
    roll: Real,
    pitch: Real,
    yaw: Real,
) -> Iso3 {
    let rotation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    let offset = rotation * board_center(pattern).coords;
    Iso3::from_parts(Translation3::from(center_c.coords - offset), rotation)
}

/// Generate `n_views` board poses with alternating tilts around X and Y.
///
/// Tilts stay within ±0.45 rad and the distance oscillates ±10% around
/// `distance`, which keeps Zhang's linear system well conditioned.
pub fn varied_board_poses(pattern: &PatternGeometry, n_views: usize, distance: Real) -> Vec<Iso3> {
    (0..n_views)
        .map(|k| {
            let phase = k as Real * 2.399_963; // golden angle
            let tilt = 0.2 + 0.25 * ((k % 3) as Real / 2.0);
            let roll = tilt * phase.sin();
            let pitch = tilt * phase.cos();
            let yaw = 0.08 * (k as Real * 1.3).sin();
            let z = distance * (1.0 + 0.1 * (k as Real * 0.9).cos());
            let center = Pt3::new(
                0.03 * distance * (k as Real * 1.7).sin(),
                0.03 * distance * (k as Real * 2.3).cos(),
                z,
            );
            board_pose_looking_at(pattern, center, roll, pitch, yaw)
        })
        .collect()
}

/// Generate `n_views` poses with a yaw rotation around the +Y axis and a Z translation ramp.
pub fn poses_yaw_y_z(
    n_views: usize,
    yaw_start_rad: Real,
    yaw_step_rad: Real,
    z_start: Real,
    z_step: Real,
) -> Vec<Iso3> {
    (0..n_views)
        .map(|view_idx| {
            let yaw = yaw_start_rad + yaw_step_rad * view_idx as Real;
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 1.0, 0.0) * yaw);
            let translation = Vector3::new(0.0, 0.0, z_start + z_step * view_idx as Real);
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project a planar target into the camera, requiring every point to be projectable.
///
/// `cam_from_target` must map target-frame points into the camera frame.
pub fn project_view_all(
    camera: &PinholeCamera,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Result<Observation> {
    let mut pixels = Vec::with_capacity(target_points.len());
    for (idx, pw) in target_points.iter().enumerate() {
        let pc = cam_from_target.transform_point(pw);
        let Some(uv) = camera.project_point(&pc) else {
            anyhow::bail!("point {idx} not projectable (z={:.6})", pc.z);
        };
        pixels.push(uv);
    }
    Observation::new(target_points.to_vec(), pixels)
}

/// Project multiple views, requiring every point to be projectable in every view.
pub fn project_views_all(
    camera: &PinholeCamera,
    target_points: &[Pt3],
    cam_from_target: &[Iso3],
) -> Result<Vec<Observation>> {
    cam_from_target
        .iter()
        .map(|pose| project_view_all(camera, pose, target_points))
        .collect()
}

/// Project the board into both cameras of a rig.
///
/// `cam2_from_cam1` is the rig transform (`X2 = R·X1 + T`); board poses are
/// expressed in camera 1.
pub fn project_stereo_views(
    camera1: &PinholeCamera,
    camera2: &PinholeCamera,
    cam2_from_cam1: &Iso3,
    target_points: &[Pt3],
    cam1_from_target: &[Iso3],
) -> Result<(Vec<Observation>, Vec<Observation>)> {
    let views1 = project_views_all(camera1, target_points, cam1_from_target)?;
    let cam2_from_target: Vec<Iso3> = cam1_from_target
        .iter()
        .map(|pose| cam2_from_cam1 * pose)
        .collect();
    let views2 = project_views_all(camera2, target_points, &cam2_from_target)?;
    Ok((views1, views2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FxFyCxCySkew;

    #[test]
    fn looking_at_centers_the_board() {
        let pattern = PatternGeometry::new(6, 9);
        let pose = board_pose_looking_at(&pattern, Pt3::new(0.0, 0.0, 20.0), 0.2, -0.1, 0.05);
        let c = pose.transform_point(&board_center(&pattern));
        assert!((c - Pt3::new(0.0, 0.0, 20.0)).norm() < 1e-12);
    }

    #[test]
    fn project_view_all_produces_matching_correspondences() {
        let cam = PinholeCamera::ideal(FxFyCxCySkew::new(800.0, 800.0, 640.0, 360.0));
        let pattern = PatternGeometry::new(3, 2).with_square_size(0.05);
        let pose = Iso3::from_parts(Translation3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());

        let view = project_view_all(&cam, &pose, &pattern.object_points()).unwrap();
        assert_eq!(view.points_3d.len(), 6);
        assert_eq!(view.points_2d.len(), 6);
        assert!((view.points_2d[0].x - 640.0).abs() < 1e-9);
    }

    #[test]
    fn varied_poses_keep_board_in_front() {
        let pattern = PatternGeometry::new(6, 9);
        for pose in varied_board_poses(&pattern, 15, 20.0) {
            for p in pattern.object_points() {
                assert!(pose.transform_point(&p).z > 10.0);
            }
        }
    }
}
