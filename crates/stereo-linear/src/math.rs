//! Numerical helpers shared by the linear solvers.

use nalgebra::DMatrix;
use stereo_core::{Mat3, Pt2, Real};

/// Hartley normalization for 2D points.
///
/// Centers points at the origin and scales so that the mean distance from
/// the origin is `√2`. Returns the normalized points and the 3x3 transform
/// `T` with `p_norm = T * p_h`, or `None` when all points coincide.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as Real;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let cx = sx / n;
    let cy = sy / n;

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = (2.0 as Real).sqrt() / mean_dist;
    let t = Mat3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    let norm = points
        .iter()
        .map(|p| Pt2::new((p.x - cx) * scale, (p.y - cy) * scale))
        .collect();
    Some((norm, t))
}

/// Null vector of `a` (right singular vector of the smallest singular value).
///
/// Under-determined systems are zero-padded to square so the null space is
/// always part of `V^T`. Also returns the conditioning ratio
/// `σ_second_smallest / σ_max`, which is ~0 when the null space is not 1-D.
pub fn null_vector(a: &DMatrix<Real>) -> Option<(Vec<Real>, Real)> {
    let cols = a.ncols();
    if cols == 0 {
        return None;
    }
    let work = if a.nrows() < cols {
        let mut pad = DMatrix::<Real>::zeros(cols, cols);
        pad.view_mut((0, 0), (a.nrows(), cols)).copy_from(a);
        pad
    } else {
        a.clone()
    };

    let svd = work.svd(false, true);
    let v_t = svd.v_t?;
    let sv = &svd.singular_values;

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&i, &j| sv[i].total_cmp(&sv[j]));
    let smallest = order[0];
    let max = sv[order[order.len() - 1]];
    let second = if order.len() > 1 { sv[order[1]] } else { max };
    let ratio = if max > 0.0 { second / max } else { 0.0 };

    Some((v_t.row(smallest).iter().copied().collect(), ratio))
}

/// Reshape a 9-vector (row-major) into a 3x3 matrix.
pub fn mat3_from_row_major(v: &[Real]) -> Mat3 {
    let mut m = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            m[(r, c)] = v[3 * r + c];
        }
    }
    m
}
