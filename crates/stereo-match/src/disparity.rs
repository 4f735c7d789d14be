use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Fractional bits of the fixed-point disparity.
pub const DISP_SHIFT: u32 = 4;
/// Scale between stored values and pixels.
pub const DISP_SCALE: i16 = 1 << DISP_SHIFT;

/// Dense disparity field in 1/16 px fixed point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisparityMap {
    pub width: u32,
    pub height: u32,
    /// Row-major `disparity · 16`, or [`DisparityMap::INVALID`].
    pub data: Vec<i16>,
}

impl DisparityMap {
    /// Marker for pixels without a trustworthy match.
    pub const INVALID: i16 = i16::MIN;

    pub fn new_invalid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Self::INVALID; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn raw(&self, x: u32, y: u32) -> i16 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Disparity in pixels, `None` for invalid or out-of-range pixels.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let v = self.raw(x, y);
        (v != Self::INVALID).then(|| v as f32 / DISP_SCALE as f32)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != Self::INVALID).count()
    }

    /// Min–max normalization for display.
    ///
    /// Valid values span `1..=255`; invalid pixels are 0. A constant field
    /// maps to 255.
    pub fn to_normalized_u8(&self) -> GrayImage {
        let (lo, hi) = self
            .data
            .iter()
            .filter(|&&v| v != Self::INVALID)
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = (hi as i32 - lo as i32).max(0);
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = self.raw(x, y);
            if v == Self::INVALID {
                return Luma([0]);
            }
            if span == 0 {
                return Luma([255]);
            }
            let t = (v as i32 - lo as i32) * 254 / span;
            Luma([(1 + t) as u8])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_access() {
        let mut d = DisparityMap::new_invalid(3, 2);
        d.data[4] = 40;
        assert_eq!(d.get(1, 1), Some(2.5));
        assert_eq!(d.get(0, 0), None);
        assert_eq!(d.get(5, 0), None);
        assert_eq!(d.valid_count(), 1);
    }

    #[test]
    fn normalization_reserves_zero_for_invalid() {
        let mut d = DisparityMap::new_invalid(3, 1);
        d.data[1] = 16;
        d.data[2] = 48;
        let img = d.to_normalized_u8();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 1);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
    }
}
