//! Grid assembly: turn loose corner candidates into an ordered lattice.
//!
//! A seed near the candidate centroid and its two nearest non-collinear
//! neighbours define the initial lattice axes. The lattice then grows
//! breadth-first: every node predicts its four neighbours from the locally
//! measured step and claims the nearest unused candidate within tolerance.
//! The result must be a hole-free `board_width × board_height` lattice.

use std::collections::{HashMap, VecDeque};
use stereo_core::{Pt2, Real, Vec2};

type Node = (i32, i32);

const MAX_SEEDS: usize = 8;
const NEIGHBOURS_FOR_AXES: usize = 8;

struct Lattice {
    nodes: HashMap<Node, usize>,
}

impl Lattice {
    fn pos(&self, points: &[Pt2], n: Node) -> Option<Pt2> {
        self.nodes.get(&n).map(|&idx| points[idx])
    }

    fn bounds(&self) -> (i32, i32, i32, i32) {
        self.nodes.keys().fold(
            (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
            |(i0, i1, j0, j1), &(i, j)| (i0.min(i), i1.max(i), j0.min(j), j1.max(j)),
        )
    }

    /// Mean step between neighbours along `dir`.
    fn mean_step(&self, points: &[Pt2], dir: Node) -> Option<Vec2> {
        let mut acc = Vec2::zeros();
        let mut n = 0usize;
        for (&(i, j), &idx) in &self.nodes {
            if let Some(next) = self.pos(points, (i + dir.0, j + dir.1)) {
                acc += next - points[idx];
                n += 1;
            }
        }
        (n > 0).then(|| acc / n as Real)
    }
}

/// Order `points` into the `width × height` raster used by observations.
///
/// Orientation: the axis with `width` nodes is the row axis, the row step
/// has a non-negative x component and row × column steps is positive in
/// image coordinates.
pub(crate) fn assemble_grid(
    points: &[Pt2],
    width: usize,
    height: usize,
    tolerance: Real,
) -> Result<Vec<Pt2>, String> {
    let needed = width * height;
    if points.len() < needed {
        return Err(format!(
            "only {} corner candidates for {} corners",
            points.len(),
            needed
        ));
    }

    let centroid = points
        .iter()
        .fold(Vec2::zeros(), |acc, p| acc + p.coords)
        / points.len() as Real;
    let mut seeds: Vec<usize> = (0..points.len()).collect();
    seeds.sort_by(|&a, &b| {
        let da = (points[a].coords - centroid).norm_squared();
        let db = (points[b].coords - centroid).norm_squared();
        da.total_cmp(&db)
    });

    let mut last_reason = String::from("no usable seed");
    for &seed in seeds.iter().take(MAX_SEEDS) {
        let Some(lattice) = grow(points, seed, tolerance, 4 * needed) else {
            continue;
        };
        match order(points, &lattice, width, height) {
            Ok(ordered) => return Ok(ordered),
            Err(reason) => {
                log::debug!("seed {seed} rejected: {reason}");
                last_reason = reason;
            }
        }
    }
    Err(last_reason)
}

fn initial_axes(points: &[Pt2], seed: usize) -> Option<(Vec2, Vec2)> {
    let p = points[seed];
    let mut near: Vec<(Real, Vec2)> = points
        .iter()
        .enumerate()
        .filter(|&(k, _)| k != seed)
        .map(|(_, q)| {
            let d = q - p;
            (d.norm(), d)
        })
        .collect();
    near.sort_by(|a, b| a.0.total_cmp(&b.0));
    near.truncate(NEIGHBOURS_FOR_AXES);

    let (la, a) = *near.first()?;
    if la <= 0.0 {
        return None;
    }
    let b = near.iter().skip(1).find_map(|&(lb, b)| {
        let cos = a.dot(&b) / (la * lb);
        let ratio = lb / la;
        (cos.abs() < 0.5 && (0.5..=2.0).contains(&ratio)).then_some(b)
    })?;
    Some((a, b))
}

fn predict_step(lattice: &Lattice, points: &[Pt2], at: Node, dir: Node, a: Vec2, b: Vec2) -> Vec2 {
    let here = lattice.pos(points, at);
    if let (Some(p), Some(back)) = (here, lattice.pos(points, (at.0 - dir.0, at.1 - dir.1))) {
        return p - back;
    }
    // Same step measured on a parallel line of the lattice.
    for side in [1, -1] {
        let off = (dir.1 * side, dir.0 * side);
        let start = (at.0 + off.0, at.1 + off.1);
        let end = (start.0 + dir.0, start.1 + dir.1);
        if let (Some(s), Some(e)) = (lattice.pos(points, start), lattice.pos(points, end)) {
            return e - s;
        }
    }
    a * dir.0 as Real + b * dir.1 as Real
}

fn nearest(points: &[Pt2], target: &Pt2) -> Option<(usize, Real)> {
    points
        .iter()
        .enumerate()
        .map(|(k, p)| (k, (p - target).norm()))
        .min_by(|x, y| x.1.total_cmp(&y.1))
}

fn grow(points: &[Pt2], seed: usize, tolerance: Real, max_nodes: usize) -> Option<Lattice> {
    let (a, b) = initial_axes(points, seed)?;
    let mut lattice = Lattice {
        nodes: HashMap::from([((0, 0), seed)]),
    };
    let mut used = vec![false; points.len()];
    used[seed] = true;
    let mut queue = VecDeque::from([(0, 0)]);

    while let Some(at) = queue.pop_front() {
        let p = lattice.pos(points, at)?;
        for dir in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let next = (at.0 + dir.0, at.1 + dir.1);
            if lattice.nodes.contains_key(&next) {
                continue;
            }
            let step = predict_step(&lattice, points, at, dir, a, b);
            let Some((idx, dist)) = nearest(points, &(p + step)) else {
                continue;
            };
            if used[idx] || dist > tolerance * step.norm() {
                continue;
            }
            used[idx] = true;
            lattice.nodes.insert(next, idx);
            queue.push_back(next);
            if lattice.nodes.len() > max_nodes {
                return Some(lattice);
            }
        }
    }
    Some(lattice)
}

fn order(points: &[Pt2], lattice: &Lattice, width: usize, height: usize) -> Result<Vec<Pt2>, String> {
    let (i0, i1, j0, j1) = lattice.bounds();
    let ni = (i1 - i0 + 1) as usize;
    let nj = (j1 - j0 + 1) as usize;
    if lattice.nodes.len() != ni * nj {
        return Err(format!(
            "lattice {ni}x{nj} has holes ({} nodes)",
            lattice.nodes.len()
        ));
    }
    let fits_i = ni == width && nj == height;
    let fits_j = ni == height && nj == width;
    if !fits_i && !fits_j {
        return Err(format!("found a {ni}x{nj} lattice"));
    }

    let step_i = lattice
        .mean_step(points, (1, 0))
        .ok_or_else(|| "degenerate lattice".to_string())?;
    let step_j = lattice
        .mean_step(points, (0, 1))
        .ok_or_else(|| "degenerate lattice".to_string())?;
    let row_is_i = match (fits_i, fits_j) {
        (true, true) => step_i.x.abs() >= step_j.x.abs(),
        (true, false) => true,
        _ => false,
    };
    let (mut row_step, col_step) = if row_is_i {
        (step_i, step_j)
    } else {
        (step_j, step_i)
    };
    let flip_row = row_step.x < 0.0 || (row_step.x == 0.0 && row_step.y < 0.0);
    if flip_row {
        row_step = -row_step;
    }
    let flip_col = row_step.x * col_step.y - row_step.y * col_step.x < 0.0;

    let mut out = vec![Pt2::origin(); width * height];
    for (&(i, j), &idx) in &lattice.nodes {
        let (ri, rj) = ((i - i0) as usize, (j - j0) as usize);
        let (u, v) = if row_is_i { (ri, rj) } else { (rj, ri) };
        let u = if flip_row { width - 1 - u } else { u };
        let v = if flip_col { height - 1 - v } else { v };
        out[v * width + u] = points[idx];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_points(w: usize, h: usize, origin: Vec2, du: Vec2, dv: Vec2) -> Vec<Pt2> {
        let mut pts = Vec::new();
        for j in 0..h {
            for i in 0..w {
                pts.push(Pt2::from(origin + du * i as Real + dv * j as Real));
            }
        }
        pts
    }

    #[test]
    fn orders_shuffled_lattice_in_raster_order() {
        let expected = lattice_points(
            4,
            3,
            Vec2::new(50.0, 40.0),
            Vec2::new(20.0, 2.0),
            Vec2::new(-1.5, 19.0),
        );
        let mut shuffled = expected.clone();
        shuffled.reverse();
        shuffled.swap(0, 5);

        let got = assemble_grid(&shuffled, 4, 3, 0.35).unwrap();
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).norm() < 1e-12);
        }
    }

    #[test]
    fn rotated_board_keeps_row_step_rightwards() {
        // Board turned upside down: its first corner is at the bottom right.
        let expected = lattice_points(
            3,
            5,
            Vec2::new(200.0, 200.0),
            Vec2::new(-20.0, 0.0),
            Vec2::new(0.0, -20.0),
        );
        let got = assemble_grid(&expected, 3, 5, 0.35).unwrap();
        let n = expected.len();
        for k in 0..n {
            assert!((got[k] - expected[n - 1 - k]).norm() < 1e-12);
        }
    }

    #[test]
    fn transposed_lattice_is_reordered() {
        // 3 wide x 2 tall requested, lattice laid out with 3 nodes vertically.
        let pts = lattice_points(
            2,
            3,
            Vec2::new(10.0, 10.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(0.0, 20.0),
        );
        let got = assemble_grid(&pts, 3, 2, 0.35).unwrap();
        // Row axis is the vertical lattice axis; handedness flips the columns.
        let row_step = got[1] - got[0];
        let col_step = got[3] - got[0];
        assert!(row_step.x >= 0.0);
        assert!(row_step.x * col_step.y - row_step.y * col_step.x > 0.0);
    }

    #[test]
    fn missing_node_is_rejected() {
        let mut pts = lattice_points(
            4,
            4,
            Vec2::new(30.0, 30.0),
            Vec2::new(15.0, 0.0),
            Vec2::new(0.0, 15.0),
        );
        pts.remove(5);
        pts.push(Pt2::new(500.0, 500.0));
        assert!(assemble_grid(&pts, 4, 4, 0.35).is_err());
    }

    #[test]
    fn larger_lattice_is_rejected() {
        let pts = lattice_points(
            5,
            4,
            Vec2::new(30.0, 30.0),
            Vec2::new(15.0, 0.0),
            Vec2::new(0.0, 15.0),
        );
        assert!(assemble_grid(&pts, 4, 4, 0.35).is_err());
    }
}
