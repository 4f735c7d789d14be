//! Seeded pixel noise for synthetic observations.

use crate::{Observation, Real, Vec2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Uniform per-axis pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPixelNoise {
    /// Seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Maximum absolute per-axis noise (pixels).
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    pub fn new(seed: u64, max_abs_px: Real) -> Self {
        Self { seed, max_abs_px }
    }

    /// Perturb every detected pixel of every view in place.
    pub fn apply(&self, views: &mut [Observation]) {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        for view in views {
            for p in &mut view.points_2d {
                let d = Vec2::new(
                    rng.random_range(-max_abs..=max_abs),
                    rng.random_range(-max_abs..=max_abs),
                );
                *p += d;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pt2, Pt3};

    fn view() -> Observation {
        Observation::new(vec![Pt3::origin(); 20], vec![Pt2::new(10.0, 10.0); 20]).unwrap()
    }

    #[test]
    fn noise_is_bounded_and_deterministic() {
        let noise = UniformPixelNoise::new(7, 0.5);
        let mut a = vec![view()];
        let mut b = vec![view()];
        noise.apply(&mut a);
        noise.apply(&mut b);
        assert_eq!(a, b);
        for p in &a[0].points_2d {
            assert!((p.x - 10.0).abs() <= 0.5 && (p.y - 10.0).abs() <= 0.5);
        }
    }
}
