//! Ray-traced rendering of planar scenes.
//!
//! Each output pixel averages `supersample²` rays through the pixel footprint.
//! A ray is back-projected through the full camera model, intersected with
//! the target plane and shaded by a texture function of the plane
//! coordinates. Pixel centers sit at integer coordinates.

use crate::{ImageSize, Iso3, PatternGeometry, PinholeCamera, Pt2, Real, Vec3};
use image::{GrayImage, Luma};

/// Gray levels used for rendered checkerboards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardShading {
    pub black: u8,
    pub white: u8,
    pub background: u8,
}

impl Default for BoardShading {
    fn default() -> Self {
        Self {
            black: 30,
            white: 220,
            background: 100,
        }
    }
}

/// Render an arbitrary textured plane seen by `camera`.
///
/// `texture(x, y)` returns the intensity in `[0, 255]` at plane coordinates
/// `(x, y)`, or `None` outside the plane support. Rays that miss the plane
/// or leave its support get `background`.
pub fn render_plane<F>(
    camera: &PinholeCamera,
    cam_from_plane: &Iso3,
    size: ImageSize,
    supersample: u32,
    background: u8,
    texture: F,
) -> GrayImage
where
    F: Fn(Real, Real) -> Option<Real>,
{
    let ss = supersample.max(1);
    let normal_c: Vec3 = cam_from_plane.rotation * Vec3::z();
    let origin_c: Vec3 = cam_from_plane.translation.vector;
    let plane_d = normal_c.dot(&origin_c);
    let bg = background as Real;
    let inv_samples = 1.0 / (ss * ss) as Real;

    let sample = |u: Real, v: Real| -> Real {
        let px = Pt2::new(u, v);
        let ray = if camera.dist.is_zero() {
            let n = camera.k.pixel_to_normalized(&px);
            Vec3::new(n.x, n.y, 1.0)
        } else {
            camera.backproject_pixel(&px)
        };
        let denom = normal_c.dot(&ray);
        if denom.abs() < 1e-12 {
            return bg;
        }
        let lambda = plane_d / denom;
        if lambda <= 0.0 {
            return bg;
        }
        let p_c = nalgebra::Point3::from(ray * lambda);
        let p_plane = cam_from_plane.inverse_transform_point(&p_c);
        texture(p_plane.x, p_plane.y).unwrap_or(bg)
    };

    GrayImage::from_fn(size.width, size.height, |x, y| {
        let mut acc = 0.0;
        for sy in 0..ss {
            for sx in 0..ss {
                let u = x as Real + (sx as Real + 0.5) / ss as Real - 0.5;
                let v = y as Real + (sy as Real + 0.5) / ss as Real - 0.5;
                acc += sample(u, v);
            }
        }
        Luma([(acc * inv_samples).round().clamp(0.0, 255.0) as u8])
    })
}

/// Render a checkerboard with `board_width × board_height` interior corners.
///
/// Interior corner `(i, j)` sits at `(i·s, j·s, 0)` on the board; the squares
/// span one extra square on every side and are framed by a white margin one
/// square wide.
pub fn render_checkerboard(
    camera: &PinholeCamera,
    cam_from_board: &Iso3,
    pattern: &PatternGeometry,
    size: ImageSize,
    supersample: u32,
    shading: BoardShading,
) -> GrayImage {
    let s = pattern.square_size;
    let w = pattern.board_width as Real;
    let h = pattern.board_height as Real;
    let black = shading.black as Real;
    let white = shading.white as Real;

    render_plane(
        camera,
        cam_from_board,
        size,
        supersample,
        shading.background,
        |x, y| {
            if x < -2.0 * s || x > (w + 1.0) * s || y < -2.0 * s || y > (h + 1.0) * s {
                return None;
            }
            if x < -s || x > w * s || y < -s || y > h * s {
                return Some(white);
            }
            let a = (x / s).floor() as i64;
            let b = (y / s).floor() as i64;
            if (a + b).rem_euclid(2) == 0 {
                Some(black)
            } else {
                Some(white)
            }
        },
    )
}

/// Smooth value-noise texture, used to give stereo matchers something to lock on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueNoiseTexture {
    pub seed: u64,
    /// Lattice spacing in plane units.
    pub cell: Real,
}

impl ValueNoiseTexture {
    pub fn new(seed: u64, cell: Real) -> Self {
        Self { seed, cell }
    }

    fn lattice(&self, i: i64, j: i64) -> Real {
        let mut z = self
            .seed
            .wrapping_add((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add((j as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as Real / (1u64 << 53) as Real
    }

    /// Intensity in `[20, 235]` at plane coordinates `(x, y)`.
    pub fn intensity(&self, x: Real, y: Real) -> Real {
        let gx = x / self.cell;
        let gy = y / self.cell;
        let i = gx.floor();
        let j = gy.floor();
        let fx = gx - i;
        let fy = gy - j;
        let (i, j) = (i as i64, j as i64);
        let top = self.lattice(i, j) * (1.0 - fx) + self.lattice(i + 1, j) * fx;
        let bottom = self.lattice(i, j + 1) * (1.0 - fx) + self.lattice(i + 1, j + 1) * fx;
        20.0 + 215.0 * (top * (1.0 - fy) + bottom * fy)
    }
}

/// Render an unbounded plane covered with [`ValueNoiseTexture`].
pub fn render_textured_plane(
    camera: &PinholeCamera,
    cam_from_plane: &Iso3,
    size: ImageSize,
    supersample: u32,
    texture: ValueNoiseTexture,
) -> GrayImage {
    render_plane(camera, cam_from_plane, size, supersample, 0, |x, y| {
        Some(texture.intensity(x, y))
    })
}
