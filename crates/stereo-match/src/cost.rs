//! Matching cost: Birchfield–Tomasi pixel dissimilarity summed over a block.
//!
//! Left pixel `x` at disparity `d` is compared with right pixel `x − d`.
//! Right coordinates outside the image are clamped to the border; those
//! columns are invalidated later by the valid-range rule.

use image::GrayImage;
use rayon::prelude::*;

/// Intensities (or prefiltered gradients) widened to `i32`.
pub(crate) fn prepare(img: &GrayImage, pre_filter_cap: u32) -> Vec<i32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw: Vec<i32> = img.as_raw().iter().map(|&v| v as i32).collect();
    if pre_filter_cap == 0 {
        return raw;
    }
    let cap = pre_filter_cap as i32;
    let at = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        raw[y * w + x]
    };
    let mut out = vec![0i32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y = y as isize;
        for (x, v) in row.iter_mut().enumerate() {
            let x = x as isize;
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            *v = gx.clamp(-cap, cap) + cap;
        }
    });
    out
}

/// Per-pixel min/max over the pixel and its half-way neighbours, in doubled units.
fn half_range(row: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let n = row.len();
    let mut lo = vec![0; n];
    let mut hi = vec![0; n];
    for x in 0..n {
        let v = 2 * row[x];
        let a = row[x] + row[x.saturating_sub(1)];
        let b = row[x] + row[(x + 1).min(n - 1)];
        lo[x] = v.min(a).min(b);
        hi[x] = v.max(a).max(b);
    }
    (lo, hi)
}

/// Shared state for building block costs of one image pair.
pub(crate) struct CostBuilder<'a> {
    pub left: &'a [i32],
    pub right: &'a [i32],
    pub width: usize,
    pub height: usize,
    pub min_d: i32,
    pub nd: usize,
    pub half: usize,
}

impl<'a> CostBuilder<'a> {
    #[inline]
    fn clamp_row(&self, y: isize) -> usize {
        y.clamp(0, self.height as isize - 1) as usize
    }

    fn pixel_cost_row(&self, y: usize) -> Vec<u32> {
        let w = self.width;
        let nd = self.nd;
        let left = &self.left[y * w..(y + 1) * w];
        let right = &self.right[y * w..(y + 1) * w];
        let (lmin, lmax) = half_range(left);
        let (rmin, rmax) = half_range(right);

        let mut out = vec![0u32; w * nd];
        for x in 0..w {
            let il = 2 * left[x];
            let cell = &mut out[x * nd..(x + 1) * nd];
            for (k, c) in cell.iter_mut().enumerate() {
                let xr = (x as i32 - (self.min_d + k as i32)).clamp(0, w as i32 - 1) as usize;
                let ir = 2 * right[xr];
                let d1 = 0.max(il - rmax[xr]).max(rmin[xr] - il);
                let d2 = 0.max(ir - lmax[x]).max(lmin[x] - ir);
                *c = ((d1.min(d2) + 1) / 2) as u32;
            }
        }
        out
    }

    /// Pixel costs box-summed along the row.
    fn hsum_row(&self, y: usize) -> Vec<u32> {
        let w = self.width;
        let nd = self.nd;
        let half = self.half as isize;
        let pc = self.pixel_cost_row(y);
        let col = |x: isize| {
            let x = x.clamp(0, w as isize - 1) as usize;
            &pc[x * nd..(x + 1) * nd]
        };

        let mut acc = vec![0u32; nd];
        for dx in -half..=half {
            for (a, c) in acc.iter_mut().zip(col(dx)) {
                *a += c;
            }
        }
        let mut out = vec![0u32; w * nd];
        out[..nd].copy_from_slice(&acc);
        for x in 1..w as isize {
            for ((a, old), new) in acc.iter_mut().zip(col(x - 1 - half)).zip(col(x + half)) {
                *a = *a + new - old;
            }
            let xu = x as usize;
            out[xu * nd..(xu + 1) * nd].copy_from_slice(&acc);
        }
        out
    }

    /// Block costs for every row (`height × width × nd`), rows in parallel.
    pub fn volume(&self) -> Vec<u16> {
        let row_len = self.width * self.nd;
        let mut hsums = vec![0u32; self.height * row_len];
        hsums
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| row.copy_from_slice(&self.hsum_row(y)));

        let half = self.half as isize;
        let mut cost = vec![0u16; self.height * row_len];
        cost.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let mut acc = vec![0u32; row_len];
                for dy in -half..=half {
                    let src = self.clamp_row(y as isize + dy);
                    for (a, v) in acc.iter_mut().zip(&hsums[src * row_len..(src + 1) * row_len]) {
                        *a += v;
                    }
                }
                saturate_into(&acc, row);
            });
        cost
    }

    /// Row-by-row block costs keeping a single running window in memory.
    pub fn rolling(&self) -> RollingCost<'_, 'a> {
        let half = self.half as isize;
        let mut vsum = vec![0u32; self.width * self.nd];
        for dy in -half..=half {
            let row = self.hsum_row(self.clamp_row(dy));
            for (a, v) in vsum.iter_mut().zip(&row) {
                *a += v;
            }
        }
        RollingCost {
            builder: self,
            next_y: 0,
            vsum,
        }
    }
}

pub(crate) struct RollingCost<'b, 'a> {
    builder: &'b CostBuilder<'a>,
    next_y: usize,
    vsum: Vec<u32>,
}

impl RollingCost<'_, '_> {
    /// Fill `out` with the block costs of the next row.
    pub fn next_row(&mut self, out: &mut [u16]) {
        let b = self.builder;
        let half = b.half as isize;
        let y = self.next_y as isize;
        if y > 0 {
            let old = b.hsum_row(b.clamp_row(y - 1 - half));
            let new = b.hsum_row(b.clamp_row(y + half));
            for ((a, o), n) in self.vsum.iter_mut().zip(&old).zip(&new) {
                *a = *a + n - o;
            }
        }
        saturate_into(&self.vsum, out);
        self.next_y += 1;
    }
}

fn saturate_into(src: &[u32], dst: &mut [u16]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s.min(u16::MAX as u32) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn birchfield_tomasi_ignores_half_pixel_shift() {
        // A ramp shifted by half a pixel has zero BT cost at the nearest disparity.
        let left: Vec<i32> = (0..8).map(|x| 10 * x).collect();
        let right: Vec<i32> = (0..8).map(|x| 10 * x + 5).collect();
        let b = CostBuilder {
            left: &left,
            right: &right,
            width: 8,
            height: 1,
            min_d: 0,
            nd: 2,
            half: 0,
        };
        let pc = b.pixel_cost_row(0);
        // x = 4, d = 0: left 40 vs right 45, right interval [40, 50] contains 40.
        assert_eq!(pc[4 * 2], 0);
        // d = 1: right pixel 3 is 35 and its interval [30, 40] contains 40.
        assert_eq!(pc[4 * 2 + 1], 0);
    }

    #[test]
    fn rolling_rows_match_volume() {
        let img_l = GrayImage::from_fn(12, 7, |x, y| Luma([((x * 37 + y * 11) % 251) as u8]));
        let img_r = GrayImage::from_fn(12, 7, |x, y| Luma([((x * 13 + y * 29) % 241) as u8]));
        let l = prepare(&img_l, 0);
        let r = prepare(&img_r, 0);
        let b = CostBuilder {
            left: &l,
            right: &r,
            width: 12,
            height: 7,
            min_d: -2,
            nd: 5,
            half: 1,
        };
        let vol = b.volume();
        let mut rolling = b.rolling();
        let mut row = vec![0u16; 12 * 5];
        for y in 0..7 {
            rolling.next_row(&mut row);
            assert_eq!(&vol[y * 60..(y + 1) * 60], &row[..]);
        }
    }

    #[test]
    fn prefilter_is_centred_on_cap() {
        let flat = GrayImage::from_pixel(5, 5, Luma([90]));
        assert!(prepare(&flat, 31).iter().all(|&v| v == 31));
    }
}
