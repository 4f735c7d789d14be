use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use stereo_core::{Iso3, Mat3, Real};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseInitError {
    #[error("intrinsic matrix is not invertible")]
    SingularIntrinsics,
    #[error("homography columns vanish after removing K")]
    DegenerateHomography,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate the pose of a planar board (Z = 0) relative to the camera from
/// intrinsics `K` and the plane -> image homography `H`.
///
/// Returns `cam_from_board`. The overall sign of `H` is chosen so the board
/// lies in front of the camera.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PoseInitError> {
    let k_inv = kmtx.try_inverse().ok_or(PoseInitError::SingularIntrinsics)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    // Scale factor λ: average of the first two column norms.
    let mean_norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if mean_norm <= Real::EPSILON {
        return Err(PoseInitError::DegenerateHomography);
    }
    let mut lambda = 1.0 / mean_norm;
    if k_inv_h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);

    // Closest rotation (polar decomposition via SVD).
    let svd = r_mat.svd(true, true);
    let mut u = svd.u.ok_or(PoseInitError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PoseInitError::SvdFailed)?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;

    let t_vec: Vector3<Real> = lambda * k_inv_h3;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t_vec), rot))
}
