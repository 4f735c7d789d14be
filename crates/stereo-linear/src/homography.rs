use crate::math::{mat3_from_row_major, normalize_points_2d, null_vector};
use nalgebra::DMatrix;
use stereo_core::{Mat3, Pt2, Real};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("correspondence count mismatch: {world} world vs {image} image points")]
    CountMismatch { world: usize, image: usize },
    #[error("points are degenerate (coincident or collinear)")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate `H` such that `x' ~ H x` using the normalized DLT.
///
/// Both point sets are Hartley-normalized before building the `2n x 9`
/// system; the result is denormalized and scaled so that `H[2,2] = 1` when
/// that entry is not vanishing.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::CountMismatch {
            world: n,
            image: image.len(),
        });
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (wn, tw) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (im, ti) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in wn.iter().zip(im.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let (h, ratio) = null_vector(&a).ok_or(HomographyError::SvdFailed)?;
    if ratio < 1e-12 {
        return Err(HomographyError::Degenerate);
    }
    let hn = mat3_from_row_major(&h);

    let ti_inv = ti.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = ti_inv * hn * tw;

    let scale = h_mat[(2, 2)];
    if scale.abs() > 1e-12 * h_mat.norm() {
        h_mat /= scale;
    } else {
        h_mat /= h_mat.norm();
    }
    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn basic_homography() {
        let w = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let img = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(2.0, 0.0),
            Pt2::new(2.0, 2.0),
            Pt2::new(0.0, 2.0),
        ];

        let h = dlt_homography(&w, &img).unwrap();
        assert!((h[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((h[(1, 1)] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn recovers_projective_map() {
        let h_gt = Mat3::new(1.2, 0.1, 320.0, -0.05, 0.9, 240.0, 1e-4, -2e-4, 1.0);
        let world: Vec<Pt2> = (0..6)
            .flat_map(|j| (0..5).map(move |i| Pt2::new(i as Real * 25.0, j as Real * 25.0)))
            .collect();
        let image: Vec<Pt2> = world
            .iter()
            .map(|p| {
                let q = h_gt * Vector3::new(p.x, p.y, 1.0);
                Pt2::new(q.x / q.z, q.y / q.z)
            })
            .collect();

        let h = dlt_homography(&world, &image).unwrap();
        assert!((h - h_gt).norm() / h_gt.norm() < 1e-8);
    }

    #[test]
    fn rejects_too_few_points() {
        let p = vec![Pt2::new(0.0, 0.0); 3];
        assert!(matches!(
            dlt_homography(&p, &p),
            Err(HomographyError::NotEnoughPoints(3))
        ));
    }

    #[test]
    fn rejects_collinear_points() {
        let w: Vec<Pt2> = (0..6).map(|i| Pt2::new(i as Real, 0.0)).collect();
        let img: Vec<Pt2> = (0..6).map(|i| Pt2::new(2.0 * i as Real, 1.0)).collect();
        assert!(dlt_homography(&w, &img).is_err());
    }
}
