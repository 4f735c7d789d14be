//! Semi-global path aggregation.
//!
//! Along a path direction `r`:
//! `L(p,d) = C(p,d) + min(L(p−r,d), L(p−r,d±1) + P1, minₖ L(p−r,k) + P2) − minₖ L(p−r,k)`.
//! The subtraction keeps `L ≤ C + P2`, so `u32` never overflows.

use rayon::prelude::*;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Penalties {
    pub p1: u32,
    pub p2: u32,
}

#[inline]
fn path_step(cost: &[u16], prev: Option<&[u32]>, pen: Penalties, out: &mut [u32]) {
    let Some(prev) = prev else {
        for (o, &c) in out.iter_mut().zip(cost) {
            *o = c as u32;
        }
        return;
    };
    let nd = cost.len();
    let min_prev = prev.iter().copied().min().unwrap_or(0);
    let jump = min_prev + pen.p2;
    for d in 0..nd {
        let mut best = prev[d].min(jump);
        if d > 0 {
            best = best.min(prev[d - 1] + pen.p1);
        }
        if d + 1 < nd {
            best = best.min(prev[d + 1] + pen.p1);
        }
        out[d] = cost[d] as u32 + best - min_prev;
    }
}

/// Accumulate one horizontal path over a row into `acc`.
pub(crate) fn horizontal_pass(cost_row: &[u16], nd: usize, forward: bool, pen: Penalties, acc: &mut [u32]) {
    let width = cost_row.len() / nd;
    let mut prev = vec![0u32; nd];
    let mut cur = vec![0u32; nd];
    for k in 0..width {
        let x = if forward { k } else { width - 1 - k };
        let cell = x * nd..(x + 1) * nd;
        path_step(&cost_row[cell.clone()], (k > 0).then_some(&prev[..]), pen, &mut cur);
        for (a, c) in acc[cell].iter_mut().zip(&cur) {
            *a += c;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
}

/// One row of a path with a vertical component; `dx` is the column step.
///
/// `prev_row` holds the same path's values on the previous row along the
/// path, or `None` on the first row.
pub(crate) fn vertical_row(
    cost_row: &[u16],
    prev_row: Option<&[u32]>,
    dx: i32,
    nd: usize,
    pen: Penalties,
    out_row: &mut [u32],
) {
    let width = cost_row.len() / nd;
    out_row
        .par_chunks_mut(nd)
        .enumerate()
        .for_each(|(x, out)| {
            let px = x as i32 - dx;
            let prev = prev_row
                .filter(|_| px >= 0 && (px as usize) < width)
                .map(|r| &r[px as usize * nd..(px as usize + 1) * nd]);
            path_step(&cost_row[x * nd..(x + 1) * nd], prev, pen, out);
        });
}

/// Eight-path aggregation over a full `height × width × nd` cost volume.
pub(crate) fn aggregate_full(cost: &[u16], width: usize, height: usize, nd: usize, pen: Penalties) -> Vec<u32> {
    let row_len = width * nd;
    let mut sum = vec![0u32; height * row_len];

    sum.par_chunks_mut(row_len)
        .zip(cost.par_chunks(row_len))
        .for_each(|(s, c)| {
            horizontal_pass(c, nd, true, pen, s);
            horizontal_pass(c, nd, false, pen, s);
        });

    let mut prev = vec![0u32; row_len];
    let mut cur = vec![0u32; row_len];
    for downwards in [true, false] {
        for dx in [-1, 0, 1] {
            for k in 0..height {
                let y = if downwards { k } else { height - 1 - k };
                let rows = y * row_len..(y + 1) * row_len;
                vertical_row(&cost[rows.clone()], (k > 0).then_some(&prev[..]), dx, nd, pen, &mut cur);
                sum[rows]
                    .par_iter_mut()
                    .zip(cur.par_iter())
                    .for_each(|(s, c)| *s += c);
                std::mem::swap(&mut prev, &mut cur);
            }
        }
    }
    sum
}

/// Single-pass aggregator: three downward paths, left-to-right and the
/// in-row right-to-left path.
pub(crate) struct ReducedAggregator {
    nd: usize,
    pen: Penalties,
    first: bool,
    prev: [Vec<u32>; 3],
    cur: [Vec<u32>; 3],
}

impl ReducedAggregator {
    const DOWNWARD_DX: [i32; 3] = [-1, 0, 1];

    pub fn new(width: usize, nd: usize, pen: Penalties) -> Self {
        let row = || vec![0u32; width * nd];
        Self {
            nd,
            pen,
            first: true,
            prev: [row(), row(), row()],
            cur: [row(), row(), row()],
        }
    }

    /// Aggregated costs of the next row into `sum` (overwritten).
    pub fn push_row(&mut self, cost_row: &[u16], sum: &mut [u32]) {
        sum.fill(0);
        horizontal_pass(cost_row, self.nd, true, self.pen, sum);
        horizontal_pass(cost_row, self.nd, false, self.pen, sum);
        for (k, &dx) in Self::DOWNWARD_DX.iter().enumerate() {
            let prev = (!self.first).then_some(&self.prev[k][..]);
            vertical_row(cost_row, prev, dx, self.nd, self.pen, &mut self.cur[k]);
            for (s, c) in sum.iter_mut().zip(&self.cur[k]) {
                *s += c;
            }
        }
        std::mem::swap(&mut self.prev, &mut self.cur);
        self.first = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEN: Penalties = Penalties { p1: 5, p2: 50 };

    #[test]
    fn first_step_copies_cost() {
        let mut out = vec![0u32; 3];
        path_step(&[4, 1, 7], None, PEN, &mut out);
        assert_eq!(out, vec![4, 1, 7]);
    }

    #[test]
    fn recursion_applies_penalties() {
        let mut out = vec![0u32; 4];
        // min_prev = 0 at d = 1.
        path_step(&[10, 10, 10, 10], Some(&[100, 0, 100, 100]), PEN, &mut out);
        assert_eq!(out, vec![15, 10, 15, 60]);
    }

    #[test]
    fn smoothing_prefers_consistent_disparity() {
        // A single noisy column in a row of clear d = 1 matches.
        let nd = 3;
        let mut cost = Vec::new();
        for x in 0..9 {
            if x == 4 {
                cost.extend_from_slice(&[0u16, 3, 9]);
            } else {
                cost.extend_from_slice(&[40u16, 0, 40]);
            }
        }
        let mut acc = vec![0u32; cost.len()];
        horizontal_pass(&cost, nd, true, PEN, &mut acc);
        horizontal_pass(&cost, nd, false, PEN, &mut acc);
        let cell = &acc[4 * nd..5 * nd];
        let best = (0..nd).min_by_key(|&d| cell[d]).unwrap();
        assert_eq!(best, 1);
    }

    #[test]
    fn reduced_matches_full_on_single_row() {
        let nd = 4;
        let cost: Vec<u16> = (0..6 * nd).map(|k| ((k * 7) % 13) as u16).collect();
        let full = aggregate_full(&cost, 6, 1, nd, PEN);
        let mut reduced = ReducedAggregator::new(6, nd, PEN);
        let mut sum = vec![0u32; cost.len()];
        reduced.push_row(&cost, &mut sum);
        // Full adds three upward paths, each equal to the cost on a single row.
        for ((f, r), c) in full.iter().zip(&sum).zip(&cost) {
            assert_eq!(*f, *r + 3 * *c as u32);
        }
    }
}
