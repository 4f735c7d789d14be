use crate::{Mat3, Pt2, Vec2};
use serde::{Deserialize, Serialize};

/// Standard pinhole intrinsics with optional skew.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew {
    /// Focal length in pixels along X.
    pub fx: f64,
    /// Focal length in pixels along Y.
    pub fy: f64,
    /// Principal point X coordinate in pixels.
    pub cx: f64,
    /// Principal point Y coordinate in pixels.
    pub cy: f64,
    /// Skew term (held at 0 by the calibrators).
    #[serde(default)]
    pub skew: f64,
}

impl FxFyCxCySkew {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Closed-form inverse of `K`.
    pub fn k_inverse(&self) -> Mat3 {
        let ifx = 1.0 / self.fx;
        let ify = 1.0 / self.fy;
        Mat3::new(
            ifx,
            -self.skew * ifx * ify,
            (self.skew * self.cy - self.cx * self.fy) * ifx * ify,
            0.0,
            ify,
            -self.cy * ify,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Attempt to construct intrinsics from a 3×3 calibration matrix `K`.
    ///
    /// The matrix is normalised so that `K[2, 2] == 1` and must have the
    /// upper-triangular structure shown above; otherwise `None` is returned.
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let eps = 1e-9;
        let k33 = k[(2, 2)];
        if k33.abs() < eps {
            return None;
        }
        let k_norm = k / k33;

        if k_norm[(1, 0)].abs() > eps || k_norm[(2, 0)].abs() > eps || k_norm[(2, 1)].abs() > eps
        {
            return None;
        }
        if k_norm[(0, 0)] <= 0.0 || k_norm[(1, 1)] <= 0.0 {
            return None;
        }

        Some(Self {
            fx: k_norm[(0, 0)],
            skew: k_norm[(0, 1)],
            cx: k_norm[(0, 2)],
            fy: k_norm[(1, 1)],
            cy: k_norm[(1, 2)],
        })
    }

    /// Map normalized (sensor-plane) coordinates to pixels.
    pub fn normalized_to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Map pixels to normalized (sensor-plane) coordinates.
    pub fn pixel_to_normalized(&self, px: &Pt2) -> Vec2 {
        let y = (px.y - self.cy) / self.fy;
        let x = (px.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_inverse_matches_numeric_inverse() {
        let k = FxFyCxCySkew {
            fx: 810.0,
            fy: 790.0,
            cx: 322.0,
            cy: 241.0,
            skew: 1.5,
        };
        let numeric = k.k_matrix().try_inverse().unwrap();
        assert!((numeric - k.k_inverse()).norm() < 1e-12);
    }

    #[test]
    fn k_matrix_roundtrip() {
        let k = FxFyCxCySkew::new(700.0, 705.0, 320.0, 240.0);
        let back = FxFyCxCySkew::try_from_k_matrix(&(k.k_matrix() * 3.0)).unwrap();
        assert_eq!(back, k);
    }

    #[test]
    fn rejects_non_triangular_matrix() {
        let mut m = FxFyCxCySkew::new(700.0, 705.0, 320.0, 240.0).k_matrix();
        m[(2, 0)] = 0.1;
        assert!(FxFyCxCySkew::try_from_k_matrix(&m).is_none());
    }
}
