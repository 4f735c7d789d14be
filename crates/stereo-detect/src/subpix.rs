//! Gradient-orthogonality corner refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` in a small window is
//! orthogonal to `p − q` (it either sits in a flat region or on an edge
//! passing through `q`). Stacking `g gᵀ (q − p) = 0` over the window, with a
//! Gaussian weight, gives a 2×2 system solved repeatedly with the window
//! re-centred on the latest estimate.

use crate::gray::GrayF32;
use nalgebra::{Matrix2, Vector2};
use stereo_core::{Pt2, Real};

/// Refine one corner; falls back to `start` if the estimate wanders off.
pub(crate) fn refine_corner(
    img: &GrayF32,
    start: Pt2,
    half_window: u32,
    epsilon: Real,
    max_iters: usize,
) -> Pt2 {
    let half = half_window as i32;
    let inv_sigma2 = 1.0 / (half_window.max(1) as Real).powi(2);
    let mut q = start;

    for _ in 0..max_iters {
        let mut a = Matrix2::<Real>::zeros();
        let mut b = Vector2::<Real>::zeros();
        for dy in -half..=half {
            for dx in -half..=half {
                let (dx, dy) = (dx as Real, dy as Real);
                let x = q.x + dx;
                let y = q.y + dy;
                let gx = 0.5 * (img.sample(x + 1.0, y) - img.sample(x - 1.0, y));
                let gy = 0.5 * (img.sample(x, y + 1.0) - img.sample(x, y - 1.0));
                let w = (-(dx * dx + dy * dy) * inv_sigma2).exp();
                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 0)] += gxy;
                a[(1, 1)] += gyy;
                b[0] += gxx * x + gxy * y;
                b[1] += gxy * x + gyy * y;
            }
        }
        let Some(inv) = a.try_inverse() else {
            break;
        };
        let next = Pt2::from(inv * b);
        let shift = (next - q).norm();
        q = next;
        if shift < epsilon {
            break;
        }
    }

    if (q - start).norm() > half_window as Real || !q.x.is_finite() || !q.y.is_finite() {
        start
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn converges_to_subpixel_junction() {
        // Supersampled quadrant pattern with the junction at (20.3, 19.6).
        let (cx, cy) = (20.3, 19.6);
        let img = GrayImage::from_fn(40, 40, |x, y| {
            let mut acc: Real = 0.0;
            for sy in 0..8 {
                for sx in 0..8 {
                    let u = x as Real + (sx as Real + 0.5) / 8.0 - 0.5;
                    let v = y as Real + (sy as Real + 0.5) / 8.0 - 0.5;
                    let dark = (u < cx) == (v < cy);
                    acc += if dark { 20.0 } else { 230.0 };
                }
            }
            Luma([(acc / 64.0).round() as u8])
        });
        let g = GrayF32::from_image(&img);
        let q = refine_corner(&g, Pt2::new(21.0, 19.0), 5, 1e-4, 50);
        assert!((q.x - cx).abs() < 0.1, "x = {}", q.x);
        assert!((q.y - cy).abs() < 0.1, "y = {}", q.y);
    }

    #[test]
    fn flat_window_keeps_start() {
        let img = GrayImage::from_pixel(30, 30, Luma([128]));
        let g = GrayF32::from_image(&img);
        let start = Pt2::new(15.0, 15.0);
        assert_eq!(refine_corner(&g, start, 5, 1e-3, 10), start);
    }
}
