use crate::math::null_vector;
use nalgebra::{DMatrix, SVector};
use stereo_core::{FxFyCxCySkew, ImageSize, Mat3, Real};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrinsicsInitError {
    #[error("need at least {required} homographies, got {got}")]
    NotEnoughHomographies { required: usize, got: usize },
    #[error("degenerate view configuration: {0}")]
    Degenerate(&'static str),
    #[error("svd failed")]
    SvdFailed,
}

/// Minimum number of plane homographies for the zero-skew closed form.
pub const MIN_HOMOGRAPHIES: usize = 2;

/// Below this conditioning ratio the image of the absolute conic is not
/// determined by the homographies.
const CONDITIONING_EPS: Real = 1e-9;

/// Zhang's `v_ij(H)` with the `B12` column removed (zero skew).
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 5> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<Real, 5>::from_row_slice(&[
        hi[0] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate zero-skew intrinsics from plane homographies (plane -> pixels).
///
/// Homographies are conditioned with the image-size normalization
/// `N = [1/s 0 -cx/s; 0 1/s -cy/s; 0 0 1]` (`s = max(width, height)`) before
/// the `B` system is solved, and `K = N⁻¹ K'` maps the result back. An
/// ill-conditioned system (e.g. every view at the same orientation) or a
/// non-definite `B` yields [`IntrinsicsInitError::Degenerate`] rather than a
/// meaningless matrix.
pub fn estimate_intrinsics_from_homographies(
    homographies: &[Mat3],
    image_size: ImageSize,
) -> Result<FxFyCxCySkew, IntrinsicsInitError> {
    if homographies.len() < MIN_HOMOGRAPHIES {
        return Err(IntrinsicsInitError::NotEnoughHomographies {
            required: MIN_HOMOGRAPHIES,
            got: homographies.len(),
        });
    }

    let s = image_size.width.max(image_size.height).max(1) as Real;
    let c0x = 0.5 * image_size.width as Real;
    let c0y = 0.5 * image_size.height as Real;
    let n = Mat3::new(1.0 / s, 0.0, -c0x / s, 0.0, 1.0 / s, -c0y / s, 0.0, 0.0, 1.0);

    let m = homographies.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 5);
    for (k, h) in homographies.iter().enumerate() {
        let hn = n * h;
        let hn = hn / hn.norm();
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let (b, ratio) = null_vector(&vmtx).ok_or(IntrinsicsInitError::SvdFailed)?;
    log::debug!("zhang init: {m} views, conditioning ratio {ratio:.3e}");
    if ratio < CONDITIONING_EPS {
        return Err(IntrinsicsInitError::Degenerate(
            "homographies do not constrain the intrinsics (too little viewpoint variation)",
        ));
    }

    let (b11, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4]);
    if b11 * b22 <= 0.0 {
        return Err(IntrinsicsInitError::Degenerate("B is not definite"));
    }

    let v0 = -b23 / b22;
    let lambda = b33 - (b13 * b13 + v0 * (-b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda / b22 <= 0.0 {
        return Err(IntrinsicsInitError::Degenerate("invalid sign for lambda"));
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda / b22).sqrt();
    let u0 = -b13 * alpha * alpha / lambda;

    let k = FxFyCxCySkew::new(alpha * s, beta * s, u0 * s + c0x, v0 * s + c0y);
    if !(k.fx.is_finite() && k.fy.is_finite() && k.cx.is_finite() && k.cy.is_finite()) {
        return Err(IntrinsicsInitError::Degenerate("non-finite intrinsics"));
    }
    Ok(k)
}
