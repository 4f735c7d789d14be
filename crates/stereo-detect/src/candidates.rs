use crate::response::ResponseMap;
use stereo_core::{Pt2, Real};

/// A response peak with a center-of-mass position estimate.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub pos: Pt2,
    pub strength: f32,
}

/// Threshold relative to the strongest response, then keep local maxima.
///
/// Ties inside the suppression window go to the first pixel in raster order.
pub(crate) fn find_candidates(
    resp: &ResponseMap,
    threshold_rel: f32,
    nms_radius: u32,
) -> Vec<Candidate> {
    let max = resp.max();
    if max <= 0.0 {
        return Vec::new();
    }
    let thr = (threshold_rel * max).max(f32::EPSILON);
    let r = nms_radius as i64;
    let (w, h) = (resp.w as i64, resp.h as i64);

    let mut out = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = resp.at(x as usize, y as usize);
            if v < thr {
                continue;
            }
            let mut is_max = true;
            'window: for ny in (y - r).max(0)..=(y + r).min(h - 1) {
                for nx in (x - r).max(0)..=(x + r).min(w - 1) {
                    if nx == x && ny == y {
                        continue;
                    }
                    let n = resp.at(nx as usize, ny as usize);
                    let earlier = (ny, nx) < (y, x);
                    if n > v || (earlier && n == v) {
                        is_max = false;
                        break 'window;
                    }
                }
            }
            if is_max {
                out.push(Candidate {
                    pos: center_of_mass(resp, x, y),
                    strength: v,
                });
            }
        }
    }
    out
}

fn center_of_mass(resp: &ResponseMap, x: i64, y: i64) -> Pt2 {
    let (mut sx, mut sy, mut sw) = (0.0 as Real, 0.0 as Real, 0.0 as Real);
    for ny in (y - 1).max(0)..=(y + 1).min(resp.h as i64 - 1) {
        for nx in (x - 1).max(0)..=(x + 1).min(resp.w as i64 - 1) {
            let v = resp.at(nx as usize, ny as usize).max(0.0) as Real;
            sx += v * nx as Real;
            sy += v * ny as Real;
            sw += v;
        }
    }
    if sw > 0.0 {
        Pt2::new(sx / sw, sy / sw)
    } else {
        Pt2::new(x as Real, y as Real)
    }
}
