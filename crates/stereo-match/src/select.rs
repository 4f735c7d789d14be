use crate::disparity::{DisparityMap, DISP_SCALE, DISP_SHIFT};

/// Winner selection settings shared by all rows.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Selection {
    pub min_d: i32,
    pub nd: usize,
    pub uniqueness_ratio: u32,
    pub disp12_max_diff: i32,
    /// Inclusive range of columns where every disparity can be evaluated.
    pub x_lo: usize,
    pub x_hi: usize,
}

/// Pick disparities for one row of aggregated costs.
///
/// A winner is rejected when any disparity more than one step away comes
/// within the uniqueness margin. Survivors get parabolic subpixel
/// refinement and, when enabled, a left–right consistency check against
/// the right-image disparities implied by the same costs.
pub(crate) fn select_row(sum_row: &[u32], sel: &Selection, out: &mut [i16]) {
    out.fill(DisparityMap::INVALID);
    if sel.x_lo > sel.x_hi {
        return;
    }
    let width = out.len();
    let nd = sel.nd;
    let scale = DISP_SCALE as i64;
    let margin = 100 - sel.uniqueness_ratio.min(100) as u64;
    // Best integer disparity and cost for each right-image column.
    let mut right: Vec<Option<(i32, u32)>> = vec![None; width];

    for x in sel.x_lo..=sel.x_hi {
        let s = &sum_row[x * nd..(x + 1) * nd];
        let mut best = 0usize;
        for d in 1..nd {
            if s[d] < s[best] {
                best = d;
            }
        }
        let best_s = s[best] as u64;
        let unique = s.iter().enumerate().all(|(d, &v)| {
            d.abs_diff(best) <= 1 || (v as u64) * margin > best_s * 100
        });
        if !unique {
            continue;
        }

        let d_abs = sel.min_d + best as i32;
        let xr = x as i64 - d_abs as i64;
        if (0..width as i64).contains(&xr) {
            let slot = &mut right[xr as usize];
            if slot.map_or(true, |(_, c)| s[best] < c) {
                *slot = Some((d_abs, s[best]));
            }
        }

        let mut value = d_abs as i64 * scale;
        if best > 0 && best + 1 < nd {
            let (sm, sp, s0) = (s[best - 1] as i64, s[best + 1] as i64, s[best] as i64);
            let denom2 = (sm + sp - 2 * s0).max(1);
            value += ((sm - sp) * scale + denom2) / (2 * denom2);
        }
        out[x] = value.clamp(i16::MIN as i64 + 1, i16::MAX as i64) as i16;
    }

    if sel.disp12_max_diff < 0 {
        return;
    }
    let disagrees = |xr: i64, d: i32| -> bool {
        if !(0..width as i64).contains(&xr) {
            return false;
        }
        match right[xr as usize] {
            Some((d2, _)) => (d2 - d).abs() > sel.disp12_max_diff,
            None => false,
        }
    };
    for x in sel.x_lo..=sel.x_hi {
        let v = out[x];
        if v == DisparityMap::INVALID {
            continue;
        }
        let d_floor = (v as i32) >> DISP_SHIFT;
        let d_ceil = (v as i32 + DISP_SCALE as i32 - 1) >> DISP_SHIFT;
        let x = x as i64;
        if disagrees(x - d_floor as i64, d_floor) && disagrees(x - d_ceil as i64, d_ceil) {
            out[x as usize] = DisparityMap::INVALID;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(nd: usize, width: usize) -> Selection {
        Selection {
            min_d: 0,
            nd,
            uniqueness_ratio: 15,
            disp12_max_diff: -1,
            x_lo: nd - 1,
            x_hi: width - 1,
        }
    }

    #[test]
    fn flat_costs_are_not_unique() {
        let nd = 4;
        let sum = vec![100u32; 6 * nd];
        let mut out = vec![0i16; 6];
        select_row(&sum, &sel(nd, 6), &mut out);
        assert!(out.iter().all(|&v| v == DisparityMap::INVALID));
    }

    #[test]
    fn symmetric_parabola_gives_integer_disparity() {
        let nd = 5;
        let mut sum = Vec::new();
        for _ in 0..6 {
            sum.extend_from_slice(&[900u32, 400, 100, 400, 900]);
        }
        let mut out = vec![0i16; 6];
        select_row(&sum, &sel(nd, 6), &mut out);
        assert_eq!(out[5], 2 * DISP_SCALE);
        // Columns left of nd - 1 cannot see the whole range.
        assert_eq!(out[3], DisparityMap::INVALID);
    }

    #[test]
    fn asymmetric_parabola_shifts_towards_cheaper_side() {
        let nd = 5;
        let sum: Vec<u32> = [900u32, 300, 100, 500, 900].repeat(6);
        let mut out = vec![0i16; 6];
        select_row(&sum, &sel(nd, 6), &mut out);
        let v = out[5];
        assert!(v < 2 * DISP_SCALE && v > DISP_SCALE, "{v}");
    }

    #[test]
    fn close_second_minimum_is_rejected() {
        let nd = 6;
        let sum: Vec<u32> = [100u32, 500, 500, 500, 500, 105].repeat(8);
        let mut out = vec![0i16; 8];
        select_row(&sum, &sel(nd, 8), &mut out);
        assert_eq!(out[7], DisparityMap::INVALID);
    }
}
