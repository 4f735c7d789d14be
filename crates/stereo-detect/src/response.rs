//! ChESS X-corner response on a 16-sample ring of radius 5.
//!
//! For ring samples `I₀..I₁₅` (opposite samples 8 apart):
//! - sum response `SR = Σₙ₌₀³ |(Iₙ + Iₙ₊₈) − (Iₙ₊₄ + Iₙ₊₁₂)|`,
//! - diff response `DR = Σₙ₌₀⁷ |Iₙ − Iₙ₊₈|`,
//! - mean response `MR = |local mean − ring mean|`,
//!
//! and `R = SR − DR − 16·MR`. X-corners give large positive values; edges and
//! blobs are pushed negative.

use crate::gray::GrayF32;
use rayon::prelude::*;

/// Ring offsets ordered by angle; entry `n + 8` mirrors entry `n`.
pub(crate) const RING5: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (3, -3),
    (5, -2),
    (5, 0),
    (5, 2),
    (3, 3),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-3, 3),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-3, -3),
    (-2, -5),
];

pub(crate) const RING_RADIUS: usize = 5;

/// Dense response map in row-major layout.
#[derive(Clone, Debug)]
pub(crate) struct ResponseMap {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::MIN, f32::max)
    }
}

#[inline]
fn response_at(img: &GrayF32, x: usize, y: usize) -> f32 {
    let mut s = [0.0f32; 16];
    for (v, &(dx, dy)) in s.iter_mut().zip(RING5.iter()) {
        let sx = (x as i32 + dx) as usize;
        let sy = (y as i32 + dy) as usize;
        *v = img.at(sx, sy);
    }

    let mut sr = 0.0;
    for n in 0..4 {
        sr += ((s[n] + s[n + 8]) - (s[n + 4] + s[n + 12])).abs();
    }
    let mut dr = 0.0;
    for n in 0..8 {
        dr += (s[n] - s[n + 8]).abs();
    }
    let ring_mean = s.iter().sum::<f32>() / 16.0;
    let local_mean = (img.at(x, y)
        + img.at(x - 1, y)
        + img.at(x + 1, y)
        + img.at(x, y - 1)
        + img.at(x, y + 1))
        / 5.0;
    let mr = (local_mean - ring_mean).abs();

    sr - dr - 16.0 * mr
}

/// Response for every pixel whose ring fits inside the image; zero elsewhere.
pub(crate) fn chess_response(img: &GrayF32) -> ResponseMap {
    let (w, h) = (img.w, img.h);
    let mut data = vec![0.0f32; w * h];
    let border = RING_RADIUS + 1;
    if w > 2 * border && h > 2 * border {
        data.par_chunks_mut(w)
            .enumerate()
            .filter(|(y, _)| *y >= border && *y < h - border)
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate().take(w - border).skip(border) {
                    *out = response_at(img, x, y);
                }
            });
    }
    ResponseMap { w, h, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn quadrant_image(size: u32, c: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let dark = (x < c) == (y < c);
            Luma([if dark { 20 } else { 230 }])
        })
    }

    #[test]
    fn ring_is_point_symmetric() {
        for n in 0..8 {
            let (a, b) = (RING5[n], RING5[n + 8]);
            assert_eq!((a.0, a.1), (-b.0, -b.1));
        }
    }

    #[test]
    fn x_corner_beats_edge() {
        let img = GrayF32::from_image(&quadrant_image(40, 20));
        let resp = chess_response(&img);
        // The junction sits between pixels 19 and 20.
        let corner = resp.at(20, 20).max(resp.at(19, 19));
        assert!(corner > 400.0, "corner response {corner}");
        // A straight edge (away from the junction) is suppressed.
        assert!(resp.at(20, 8) < 0.1 * corner);
        assert!(resp.at(8, 20) < 0.1 * corner);
        // Flat regions have zero response.
        assert_eq!(resp.at(8, 8), 0.0);
    }
}
