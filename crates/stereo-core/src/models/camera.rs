use crate::{BrownConrady5, FxFyCxCySkew, Mat3, Pt2, Pt3, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole camera with Brown–Conrady distortion.
///
/// This is the value type owned per camera by a calibration session. It is
/// `Copy`, so sharing it across threads after calibration needs no locking.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub k: FxFyCxCySkew,
    pub dist: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(k: FxFyCxCySkew, dist: BrownConrady5) -> Self {
        Self { k, dist }
    }

    /// Camera without lens distortion.
    pub fn ideal(k: FxFyCxCySkew) -> Self {
        Self {
            k,
            dist: BrownConrady5::zero(),
        }
    }

    pub fn k_matrix(&self) -> Mat3 {
        self.k.k_matrix()
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project_point(&self, p_c: &Pt3) -> Option<Pt2> {
        if p_c.z <= Real::EPSILON {
            return None;
        }
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        Some(self.k.normalized_to_pixel(&self.dist.distort(&n)))
    }

    /// Map a measured (distorted) pixel to undistorted normalized coordinates.
    pub fn pixel_to_normalized(&self, px: &Pt2) -> Vec2 {
        self.dist.undistort(&self.k.pixel_to_normalized(px))
    }

    /// Map a measured (distorted) pixel to the pixel an ideal camera with the
    /// same `K` would observe.
    pub fn undistort_pixel(&self, px: &Pt2) -> Pt2 {
        self.k.normalized_to_pixel(&self.pixel_to_normalized(px))
    }

    /// Undistort many pixels at once.
    pub fn undistort_pixels(&self, pixels: &[Pt2]) -> Vec<Pt2> {
        pixels.iter().map(|p| self.undistort_pixel(p)).collect()
    }

    /// Ray direction (on the `z = 1` plane) through a measured pixel.
    pub fn backproject_pixel(&self, px: &Pt2) -> Vec3 {
        let n = self.pixel_to_normalized(px);
        Vec3::new(n.x, n.y, 1.0)
    }
}
