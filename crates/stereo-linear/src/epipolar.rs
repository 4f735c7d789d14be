//! Epipolar geometry helpers for a calibrated or uncalibrated pair.
//!
//! - The essential matrix `E` relates **normalized** coordinates
//!   (`n2ᵀ E n1 = 0`).
//! - The fundamental matrix `F` relates **pixel** coordinates
//!   (`p2ᵀ F p1 = 0`).
//!
//! The rig convention is `X2 = R·X1 + T`.

use crate::math::{mat3_from_row_major, normalize_points_2d, null_vector};
use nalgebra::{DMatrix, Matrix3};
use stereo_core::{skew_symmetric, FxFyCxCySkew, Mat3, Pt2, Real, Vec3};
use thiserror::Error;

/// Errors that can occur during fundamental / essential matrix estimation.
#[derive(Debug, Error)]
pub enum EpipolarError {
    #[error("need at least {required} point correspondences, got {got}")]
    NotEnoughPoints { required: usize, got: usize },
    #[error("correspondence count mismatch: {0} vs {1}")]
    CountMismatch(usize, usize),
    #[error("correspondences are degenerate")]
    Degenerate,
    #[error("svd failed in epipolar estimation")]
    SvdFailed,
}

/// Which image the input points of [`compute_correspond_epilines`] belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpilineImage {
    /// Points live in image 1; lines are returned in image 2 (`l2 = F·p1`).
    First,
    /// Points live in image 2; lines are returned in image 1 (`l1 = Fᵀ·p2`).
    Second,
}

/// `E = [T]ₓ·R`.
pub fn essential_from_pose(r: &Mat3, t: &Vec3) -> Mat3 {
    skew_symmetric(t) * r
}

/// Scale `F` to unit Frobenius norm with a non-negative `F[2,2]`.
pub fn normalize_fundamental(f: &Mat3) -> Mat3 {
    let norm = f.norm();
    if norm <= Real::EPSILON {
        return *f;
    }
    let mut out = f / norm;
    if out[(2, 2)] < 0.0 {
        out = -out;
    }
    out
}

/// `F = K2⁻ᵀ·E·K1⁻¹`, normalized with [`normalize_fundamental`].
pub fn fundamental_from_essential(e: &Mat3, k1: &FxFyCxCySkew, k2: &FxFyCxCySkew) -> Mat3 {
    normalize_fundamental(&(k2.k_inverse().transpose() * e * k1.k_inverse()))
}

/// Epipolar lines `(a, b, c)` with `a² + b² = 1` for each input point.
///
/// Lines whose normal vanishes (point at the epipole) are returned unscaled.
pub fn compute_correspond_epilines(points: &[Pt2], which: EpilineImage, f: &Mat3) -> Vec<Vec3> {
    let m = match which {
        EpilineImage::First => *f,
        EpilineImage::Second => f.transpose(),
    };
    points
        .iter()
        .map(|p| {
            let l = m * Vec3::new(p.x, p.y, 1.0);
            let n = (l.x * l.x + l.y * l.y).sqrt();
            if n > Real::EPSILON {
                l / n
            } else {
                l
            }
        })
        .collect()
}

/// Distances of `p2` to `F·p1` and of `p1` to `Fᵀ·p2`, in pixels.
pub fn epipolar_distance(f: &Mat3, p1: &Pt2, p2: &Pt2) -> (Real, Real) {
    let x1 = Vec3::new(p1.x, p1.y, 1.0);
    let x2 = Vec3::new(p2.x, p2.y, 1.0);
    let l2 = f * x1;
    let l1 = f.transpose() * x2;
    let num = x2.dot(&l2).abs();
    let d2 = num / (l2.x * l2.x + l2.y * l2.y).sqrt().max(Real::EPSILON);
    let d1 = num / (l1.x * l1.x + l1.y * l1.y).sqrt().max(Real::EPSILON);
    (d1, d2)
}

/// Normalized 8-point algorithm for the fundamental matrix.
///
/// `pts1` and `pts2` are corresponding pixel points. The returned matrix is
/// rank-2, normalized with [`normalize_fundamental`] and satisfies
/// `p2ᵀ F p1 ≈ 0`.
pub fn fundamental_8point(pts1: &[Pt2], pts2: &[Pt2]) -> Result<Mat3, EpipolarError> {
    let n = pts1.len();
    if pts2.len() != n {
        return Err(EpipolarError::CountMismatch(n, pts2.len()));
    }
    if n < 8 {
        return Err(EpipolarError::NotEnoughPoints { required: 8, got: n });
    }

    let (n1, t1) = normalize_points_2d(pts1).ok_or(EpipolarError::Degenerate)?;
    let (n2, t2) = normalize_points_2d(pts2).ok_or(EpipolarError::Degenerate)?;

    let mut a = DMatrix::<Real>::zeros(n, 9);
    for (i, (p1, p2)) in n1.iter().zip(n2.iter()).enumerate() {
        let (x, y) = (p1.x, p1.y);
        let (xp, yp) = (p2.x, p2.y);
        a[(i, 0)] = xp * x;
        a[(i, 1)] = xp * y;
        a[(i, 2)] = xp;
        a[(i, 3)] = yp * x;
        a[(i, 4)] = yp * y;
        a[(i, 5)] = yp;
        a[(i, 6)] = x;
        a[(i, 7)] = y;
        a[(i, 8)] = 1.0;
    }

    let (f_vec, ratio) = null_vector(&a).ok_or(EpipolarError::SvdFailed)?;
    if ratio < 1e-12 {
        return Err(EpipolarError::Degenerate);
    }
    let f = enforce_rank2(&mat3_from_row_major(&f_vec))?;
    Ok(normalize_fundamental(&(t2.transpose() * f * t1)))
}

fn enforce_rank2(f: &Mat3) -> Result<Mat3, EpipolarError> {
    let svd = f.svd(true, true);
    let u = svd.u.ok_or(EpipolarError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;
    let mut s = svd.singular_values;
    let (min_idx, _) = s.argmin();
    s[min_idx] = 0.0;
    Ok(u * Matrix3::from_diagonal(&s) * v_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use stereo_core::Pt3;

    fn rig() -> (FxFyCxCySkew, FxFyCxCySkew, Mat3, Vec3) {
        let k1 = FxFyCxCySkew::new(800.0, 800.0, 320.0, 240.0);
        let k2 = FxFyCxCySkew::new(780.0, 790.0, 330.0, 235.0);
        let r = *Rotation3::from_euler_angles(0.02, -0.05, 0.01).matrix();
        let t = Vector3::new(-0.2, 0.01, 0.005);
        (k1, k2, r, t)
    }

    fn project(k: &FxFyCxCySkew, p: &Pt3) -> Pt2 {
        k.normalized_to_pixel(&nalgebra::Vector2::new(p.x / p.z, p.y / p.z))
    }

    fn scene() -> Vec<Pt3> {
        (0..20)
            .map(|i| {
                let a = i as Real;
                Pt3::new((a * 0.7).sin(), (a * 1.3).cos() * 0.6, 3.0 + (a * 0.4).sin())
            })
            .collect()
    }

    #[test]
    fn fundamental_from_pose_satisfies_constraint() {
        let (k1, k2, r, t) = rig();
        let f = fundamental_from_essential(&essential_from_pose(&r, &t), &k1, &k2);
        assert!((f.norm() - 1.0).abs() < 1e-12);
        assert!(f[(2, 2)] >= 0.0);

        for p in scene() {
            let p1 = project(&k1, &p);
            let p2 = project(&k2, &Pt3::from(r * p.coords + t));
            let (d1, d2) = epipolar_distance(&f, &p1, &p2);
            assert!(d1 < 1e-9 && d2 < 1e-9);
        }
    }

    #[test]
    fn eight_point_matches_pose_fundamental() {
        let (k1, k2, r, t) = rig();
        let f_gt = fundamental_from_essential(&essential_from_pose(&r, &t), &k1, &k2);
        let pts = scene();
        let p1: Vec<Pt2> = pts.iter().map(|p| project(&k1, p)).collect();
        let p2: Vec<Pt2> = pts
            .iter()
            .map(|p| project(&k2, &Pt3::from(r * p.coords + t)))
            .collect();

        let f = fundamental_8point(&p1, &p2).unwrap();
        assert!((f - f_gt).norm() < 1e-6, "F differs: {}", (f - f_gt).norm());
        assert!(f.determinant().abs() < 1e-12);
    }

    #[test]
    fn epilines_are_normalized_and_contain_matches() {
        let (k1, k2, r, t) = rig();
        let f = fundamental_from_essential(&essential_from_pose(&r, &t), &k1, &k2);
        let pts = scene();
        let p1: Vec<Pt2> = pts.iter().map(|p| project(&k1, p)).collect();
        let p2: Vec<Pt2> = pts
            .iter()
            .map(|p| project(&k2, &Pt3::from(r * p.coords + t)))
            .collect();

        let lines = compute_correspond_epilines(&p1, EpilineImage::First, &f);
        for (l, q) in lines.iter().zip(&p2) {
            assert!((l.x * l.x + l.y * l.y - 1.0).abs() < 1e-12);
            assert!((l.x * q.x + l.y * q.y + l.z).abs() < 1e-8);
        }
        let back = compute_correspond_epilines(&p2, EpilineImage::Second, &f);
        for (l, q) in back.iter().zip(&p1) {
            assert!((l.x * q.x + l.y * q.y + l.z).abs() < 1e-8);
        }
    }

    #[test]
    fn eight_point_needs_eight() {
        let p = vec![Pt2::new(1.0, 2.0); 7];
        assert!(matches!(
            fundamental_8point(&p, &p),
            Err(EpipolarError::NotEnoughPoints { required: 8, got: 7 })
        ));
    }
}
