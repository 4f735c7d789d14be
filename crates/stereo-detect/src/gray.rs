use image::GrayImage;

/// Row-major `f32` copy of an 8-bit image with clamped bilinear sampling.
#[derive(Clone, Debug)]
pub(crate) struct GrayF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl GrayF32 {
    pub fn from_image(img: &GrayImage) -> Self {
        Self {
            w: img.width() as usize,
            h: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    pub fn intensity_range(&self) -> f32 {
        let (lo, hi) = self
            .data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if self.data.is_empty() {
            0.0
        } else {
            hi - lo
        }
    }

    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let max_x = (self.w - 1) as f64;
        let max_y = (self.h - 1) as f64;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.w - 1);
        let y1 = (y0 + 1).min(self.h - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let top = self.at(x0, y0) as f64 * (1.0 - fx) + self.at(x1, y0) as f64 * fx;
        let bottom = self.at(x0, y1) as f64 * (1.0 - fx) + self.at(x1, y1) as f64 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn bilinear_sample_interpolates_and_clamps() {
        let img = GrayImage::from_fn(4, 2, |x, _| Luma([(x * 10) as u8]));
        let g = GrayF32::from_image(&img);
        assert!((g.sample(1.5, 0.5) - 15.0).abs() < 1e-9);
        assert!((g.sample(-3.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((g.sample(10.0, 5.0) - 30.0).abs() < 1e-9);
        assert_eq!(g.intensity_range(), 30.0);
    }
}
