use super::RectifyError;
use crate::epipolar::epipolar_distance;
use nalgebra::{DMatrix, DVector, Matrix3};
use stereo_core::{skew_symmetric, FxFyCxCySkew, ImageSize, Mat3, Pt2, Real, Vec3};

/// Minimum number of inlier correspondences for projective rectification.
pub const MIN_INLIERS: usize = 8;

/// Output of [`rectify_uncalibrated`].
#[derive(Debug, Clone, PartialEq)]
pub struct UncalibratedRectification {
    /// Homography applied to image 1.
    pub h1: Mat3,
    /// Homography applied to image 2.
    pub h2: Mat3,
    /// Number of correspondences that passed the epipolar threshold.
    pub inliers: usize,
}

/// Projective rectification from correspondences and `F` (Hartley's method).
///
/// `threshold > 0` drops correspondences whose distance to their epipolar
/// line (in either image) exceeds it. `H2` moves the epipole of image 2 to
/// infinity along x while keeping the image center fixed; `H1` is the
/// matching homography that minimizes the horizontal disparity of the
/// remaining correspondences.
pub fn rectify_uncalibrated(
    pts1: &[Pt2],
    pts2: &[Pt2],
    f: &Mat3,
    image_size: ImageSize,
    threshold: Real,
) -> Result<UncalibratedRectification, RectifyError> {
    if pts1.len() != pts2.len() {
        return Err(RectifyError::CountMismatch(pts1.len(), pts2.len()));
    }

    let (m1, m2): (Vec<Pt2>, Vec<Pt2>) = pts1
        .iter()
        .zip(pts2)
        .filter(|(p1, p2)| {
            if threshold <= 0.0 {
                return true;
            }
            let (d1, d2) = epipolar_distance(f, p1, p2);
            d1 <= threshold && d2 <= threshold
        })
        .map(|(p1, p2)| (*p1, *p2))
        .unzip();
    if m1.len() < MIN_INLIERS {
        return Err(RectifyError::NotEnoughInliers {
            required: MIN_INLIERS,
            got: m1.len(),
        });
    }

    // Work in centered, scale-normalized coordinates: p = N·p_n.
    let s = image_size.width.max(image_size.height).max(1) as Real;
    let cx = 0.5 * (image_size.width.saturating_sub(1)) as Real;
    let cy = 0.5 * (image_size.height.saturating_sub(1)) as Real;
    let n_mat = Mat3::new(s, 0.0, cx, 0.0, s, cy, 0.0, 0.0, 1.0);
    let n_inv = Mat3::new(1.0 / s, 0.0, -cx / s, 0.0, 1.0 / s, -cy / s, 0.0, 0.0, 1.0);

    let f_n = n_mat.transpose() * f * n_mat;
    let f_norm = f_n.norm();
    if f_norm <= Real::EPSILON {
        return Err(RectifyError::Singular("fundamental matrix vanishes"));
    }
    let f_n = f_n / f_norm;

    // Left epipole: F_nᵀ·e2 = 0.
    let svd = f_n.svd(true, false);
    let u = svd.u.ok_or(RectifyError::SvdFailed)?;
    let (min_idx, _) = svd.singular_values.argmin();
    let e2: Vec3 = u.column(min_idx).into_owned();

    let dir = (e2.x * e2.x + e2.y * e2.y).sqrt();
    if dir <= 1e-12 {
        return Err(RectifyError::DegenerateEpipole(
            "epipole coincides with the image center",
        ));
    }
    // Rotate the epipole onto the x-axis, keeping the rotation within ±90°
    // so that neither image is turned upside down.
    let (mut a, mut b) = (e2.x / dir, e2.y / dir);
    if a < 0.0 {
        a = -a;
        b = -b;
    }
    let rot = Mat3::new(a, b, 0.0, -b, a, 0.0, 0.0, 0.0, 1.0);
    let e_r = rot * e2;
    let mut g = Mat3::identity();
    g[(2, 0)] = -e_r.z / e_r.x;
    if !g[(2, 0)].is_finite() {
        return Err(RectifyError::DegenerateEpipole("epipole not on the x-axis"));
    }
    let h2_n = g * rot;

    // Compatible homography H0 = H2·M with M = [e2]ₓ·F + e2·(1, 1, 1).
    let m = skew_symmetric(&e2) * f_n + e2 * Vec3::new(1.0, 1.0, 1.0).transpose();
    let h0 = h2_n * m;

    // Affine correction H_A = [a b c; 0 1 0; 0 0 1] minimizing Σ(x̂1 - x̂2)².
    let n = m1.len();
    let mut a_mat = DMatrix::<Real>::zeros(n, 3);
    let mut rhs = DVector::<Real>::zeros(n);
    for (i, (p1, p2)) in m1.iter().zip(&m2).enumerate() {
        let q1 = h0 * n_inv * Vec3::new(p1.x, p1.y, 1.0);
        let q2 = h2_n * n_inv * Vec3::new(p2.x, p2.y, 1.0);
        if q1.z.abs() <= Real::EPSILON || q2.z.abs() <= Real::EPSILON {
            return Err(RectifyError::Singular("correspondence mapped to infinity"));
        }
        a_mat[(i, 0)] = q1.x / q1.z;
        a_mat[(i, 1)] = q1.y / q1.z;
        a_mat[(i, 2)] = 1.0;
        rhs[i] = q2.x / q2.z;
    }
    let abc = a_mat
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(RectifyError::Singular)?;
    let h_a = Mat3::new(abc[0], abc[1], abc[2], 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);

    let h1 = n_mat * h_a * h0 * n_inv;
    let h2 = n_mat * h2_n * n_inv;
    if h1.determinant().abs() <= 1e-12 * h1.norm().powi(3) {
        return Err(RectifyError::Singular("H1 is not invertible"));
    }

    log::debug!("uncalibrated rectification: {n} inliers, epipole direction ({a:.4}, {b:.4})");
    Ok(UncalibratedRectification {
        h1,
        h2,
        inliers: n,
    })
}

/// Rectifying "rotation" `R = K⁻¹·H·K` for the map builder.
///
/// Exact when `H` came from a pure rotation about the center of `K`; for
/// projective rectification it is an approximation whose quality depends on
/// the intrinsics the caller supplies.
pub fn rotation_from_homography(h: &Mat3, k: &FxFyCxCySkew) -> Mat3 {
    let r: Matrix3<Real> = k.k_inverse() * h * k.k_matrix();
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epipolar::{essential_from_pose, fundamental_from_essential};
    use nalgebra::{Rotation3, Vector2};
    use stereo_core::Pt3;

    struct Scene {
        k1: FxFyCxCySkew,
        k2: FxFyCxCySkew,
        f: Mat3,
        p1: Vec<Pt2>,
        p2: Vec<Pt2>,
    }

    fn scene() -> Scene {
        let k1 = FxFyCxCySkew::new(700.0, 700.0, 320.0, 240.0);
        let k2 = FxFyCxCySkew::new(690.0, 695.0, 318.0, 244.0);
        let r = *Rotation3::from_euler_angles(0.02, 0.04, -0.01).matrix();
        let t = Vec3::new(-0.15, 0.01, 0.01);
        let f = fundamental_from_essential(&essential_from_pose(&r, &t), &k1, &k2);

        let mut p1 = Vec::new();
        let mut p2 = Vec::new();
        for i in 0..40 {
            let a = i as Real;
            let x = Pt3::new(0.8 * (a * 0.7).sin(), 0.6 * (a * 1.1).cos(), 2.5 + 0.8 * (a * 0.3).sin());
            let x2 = r * x.coords + t;
            p1.push(k1.normalized_to_pixel(&Vector2::new(x.x / x.z, x.y / x.z)));
            p2.push(k2.normalized_to_pixel(&Vector2::new(x2.x / x2.z, x2.y / x2.z)));
        }
        Scene { k1, k2, f, p1, p2 }
    }

    fn apply(h: &Mat3, p: &Pt2) -> Pt2 {
        let q = h * Vec3::new(p.x, p.y, 1.0);
        Pt2::new(q.x / q.z, q.y / q.z)
    }

    #[test]
    fn rectified_correspondences_share_rows() {
        let s = scene();
        let rect = rectify_uncalibrated(&s.p1, &s.p2, &s.f, ImageSize::new(640, 480), 3.0).unwrap();
        assert_eq!(rect.inliers, 40);
        for (a, b) in s.p1.iter().zip(&s.p2) {
            let q1 = apply(&rect.h1, a);
            let q2 = apply(&rect.h2, b);
            assert!((q1.y - q2.y).abs() < 1e-6, "rows {} vs {}", q1.y, q2.y);
        }
        // Image center stays put in image 2 and nothing is flipped.
        let c = apply(&rect.h2, &Pt2::new(319.5, 239.5));
        assert!((c - Pt2::new(319.5, 239.5)).norm() < 1e-6);
        assert!(rect.h2[(0, 0)] > 0.0 && rect.h2[(1, 1)] > 0.0);
    }

    #[test]
    fn threshold_excludes_outliers() {
        let mut s = scene();
        s.p2[0].y += 25.0;
        s.p2[1].y -= 40.0;
        let rect = rectify_uncalibrated(&s.p1, &s.p2, &s.f, ImageSize::new(640, 480), 3.0).unwrap();
        assert_eq!(rect.inliers, 38);
    }

    #[test]
    fn too_few_inliers_fail() {
        let s = scene();
        let err = rectify_uncalibrated(&s.p1[..7], &s.p2[..7], &s.f, ImageSize::new(640, 480), 3.0);
        assert!(matches!(
            err,
            Err(RectifyError::NotEnoughInliers { required: 8, got: 7 })
        ));
    }

    #[test]
    fn rotation_from_pure_rotation_homography_is_exact() {
        let s = scene();
        let r = *Rotation3::from_euler_angles(0.05, -0.02, 0.1).matrix();
        let h = s.k2.k_matrix() * r * s.k2.k_inverse();
        let r_est = rotation_from_homography(&h, &s.k2);
        assert!((r_est - r).norm() < 1e-12);
        let _ = s.k1;
    }
}
