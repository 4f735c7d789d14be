use crate::{Real, Vec2};
use serde::{Deserialize, Serialize};

fn default_undistort_iters() -> u32 {
    20
}

/// Brown–Conrady 5-parameter radial–tangential distortion.
///
/// Coefficient order follows the usual `(k1, k2, p1, p2, k3)` vector layout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
    /// Fixed-point iterations used by [`BrownConrady5::undistort`].
    #[serde(default = "default_undistort_iters")]
    pub iters: u32,
}

impl Default for BrownConrady5 {
    fn default() -> Self {
        Self::zero()
    }
}

impl BrownConrady5 {
    pub fn zero() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
            iters: default_undistort_iters(),
        }
    }

    pub fn from_coeffs(c: [Real; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            iters: default_undistort_iters(),
        }
    }

    pub fn coeffs(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs().iter().all(|c| *c == 0.0)
    }

    fn radial_and_tangential(&self, x: Real, y: Real) -> (Real, Real, Real) {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (radial, x_tan, y_tan)
    }

    /// Apply distortion to undistorted normalized coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (radial, x_tan, y_tan) = self.radial_and_tangential(n.x, n.y);
        Vec2::new(n.x * radial + x_tan, n.y * radial + y_tan)
    }

    /// Invert [`BrownConrady5::distort`] by fixed-point iteration.
    ///
    /// Starts from the distorted coordinates and repeatedly pulls the estimate
    /// back: `x ← (x_d − tangential(x)) / radial(x)`.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        if self.is_zero() {
            return *n_dist;
        }
        let mut x = n_dist.x;
        let mut y = n_dist.y;
        for _ in 0..self.iters.max(1) {
            let (radial, x_tan, y_tan) = self.radial_and_tangential(x, y);
            let x_new = (n_dist.x - x_tan) / radial;
            let y_new = (n_dist.y - y_tan) / radial;
            let step = (x_new - x).abs().max((y_new - y).abs());
            x = x_new;
            y = y_new;
            if step < 1e-14 {
                break;
            }
        }
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undistort_inverts_distort() {
        let d = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            p1: 0.001,
            p2: -0.0015,
            k3: 0.0,
            iters: 30,
        };
        for &(x, y) in &[(0.1, -0.2), (0.35, 0.25), (-0.4, 0.05)] {
            let n = Vec2::new(x, y);
            let back = d.undistort(&d.distort(&n));
            assert!((back - n).norm() < 1e-9, "({x},{y}) -> {back:?}");
        }
    }

    #[test]
    fn zero_distortion_is_identity() {
        let n = Vec2::new(0.3, -0.1);
        assert_eq!(BrownConrady5::zero().distort(&n), n);
        assert_eq!(BrownConrady5::zero().undistort(&n), n);
    }
}
