//! Rectification maps and the engine that builds them in either mode.

use image::{GrayImage, Luma};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Mat3, Mat34, Mat4, Observation, PinholeCamera, Pt2, Real, Vec2, Vec3};
use stereo_linear::{rectify_uncalibrated, rotation_from_homography, stereo_rectify};

use crate::config::{HomographyIntrinsics, Interpolation, RectificationConfig, RectificationMode};
use crate::error::{Stage, StereoError};
use crate::stereo::{paired_corners, StereoCalibration};

/// Dense lookup table: destination pixel → source pixel.
///
/// Holds the rotation and projection it was built from but no reference to
/// the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectifyMap {
    pub width: u32,
    pub height: u32,
    /// Source column per destination pixel, row-major.
    pub map_x: Vec<f32>,
    /// Source row per destination pixel, row-major.
    pub map_y: Vec<f32>,
    pub rotation: Mat3,
    pub projection: Mat34,
}

impl RectifyMap {
    #[inline]
    pub fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let i = y as usize * self.width as usize + x as usize;
        (self.map_x[i], self.map_y[i])
    }
}

/// Build the undistort-rectify lookup for one camera.
///
/// A destination pixel is back-projected with the left 3×3 block of
/// `projection`, taken back through `rotation`, distorted with the camera's
/// model and mapped to source pixels. Pixels whose ray falls behind the
/// camera map to `-1`.
pub fn init_undistort_rectify_map(
    camera: &PinholeCamera,
    rotation: &Mat3,
    projection: &Mat34,
    size: ImageSize,
) -> Result<RectifyMap, StereoError> {
    let k_new: Mat3 = projection.fixed_view::<3, 3>(0, 0).into_owned();
    let inv = (k_new * rotation).try_inverse().ok_or_else(|| {
        StereoError::degenerate(Stage::Rectification, "rectifying transform is singular")
    })?;

    let (w, h) = (size.width as usize, size.height as usize);
    let mut map_x = vec![-1.0f32; w * h];
    let mut map_y = vec![-1.0f32; w * h];
    map_x
        .par_chunks_mut(w.max(1))
        .zip(map_y.par_chunks_mut(w.max(1)))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            for x in 0..w {
                let ray = inv * Vec3::new(x as Real, y as Real, 1.0);
                if ray.z <= Real::EPSILON {
                    continue;
                }
                let n = Vec2::new(ray.x / ray.z, ray.y / ray.z);
                let px = camera.k.normalized_to_pixel(&camera.dist.distort(&n));
                row_x[x] = px.x as f32;
                row_y[x] = px.y as f32;
            }
        });

    Ok(RectifyMap {
        width: size.width,
        height: size.height,
        map_x,
        map_y,
        rotation: *rotation,
        projection: *projection,
    })
}

/// Resample `image` through `map`; samples outside the source are black.
pub fn remap(image: &GrayImage, map: &RectifyMap, interpolation: Interpolation) -> GrayImage {
    let (sw, sh) = (image.width() as i64, image.height() as i64);
    let src = image.as_raw();
    let at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= sw || y >= sh {
            0.0
        } else {
            src[(y * sw + x) as usize] as f32
        }
    };
    let w = map.width as usize;
    let mut out = vec![0u8; w * map.height as usize];
    out.par_chunks_mut(w.max(1)).enumerate().for_each(|(y, row)| {
        for (x, px) in row.iter_mut().enumerate() {
            let (sx, sy) = map.source(x as u32, y as u32);
            if !(sx > -1.0 && sy > -1.0 && sx < sw as f32 && sy < sh as f32) {
                continue;
            }
            let v = match interpolation {
                Interpolation::Nearest => at(sx.round() as i64, sy.round() as i64),
                Interpolation::Bilinear => {
                    let x0 = sx.floor() as i64;
                    let y0 = sy.floor() as i64;
                    let fx = sx - x0 as f32;
                    let fy = sy - y0 as f32;
                    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
                    let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
                    top * (1.0 - fy) + bottom * fy
                }
            };
            *px = v.round().clamp(0.0, 255.0) as u8;
        }
    });
    GrayImage::from_raw(map.width, map.height, out)
        .unwrap_or_else(|| GrayImage::from_pixel(map.width, map.height, Luma([0])))
}

/// Rectification of one rig: the two maps plus mode-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoRectification {
    pub mode: RectificationMode,
    pub left: RectifyMap,
    pub right: RectifyMap,
    /// Disparity-to-depth matrix (calibrated mode only).
    pub q: Option<Mat4>,
    /// Image homographies (uncalibrated mode only).
    pub homographies: Option<(Mat3, Mat3)>,
    pub interpolation: Interpolation,
}

impl StereoRectification {
    /// Rectify a raw pair; both images are remapped in parallel.
    pub fn rectify_pair(&self, left: &GrayImage, right: &GrayImage) -> (GrayImage, GrayImage) {
        rayon::join(
            || remap(left, &self.left, self.interpolation),
            || remap(right, &self.right, self.interpolation),
        )
    }
}

/// Builds [`StereoRectification`]s according to a [`RectificationConfig`].
#[derive(Debug, Clone, Default)]
pub struct RectificationEngine {
    pub config: RectificationConfig,
}

fn build_maps(
    cam1: &PinholeCamera,
    cam2: &PinholeCamera,
    (r1, p1): (&Mat3, &Mat34),
    (r2, p2): (&Mat3, &Mat34),
    size: ImageSize,
) -> Result<(RectifyMap, RectifyMap), StereoError> {
    let (left, right) = rayon::join(
        || init_undistort_rectify_map(cam1, r1, p1, size),
        || init_undistort_rectify_map(cam2, r2, p2, size),
    );
    Ok((left?, right?))
}

fn projection_from_k(k: &Mat3) -> Mat34 {
    let mut p = Mat34::zeros();
    p.fixed_view_mut::<3, 3>(0, 0).copy_from(k);
    p
}

impl RectificationEngine {
    pub fn new(config: RectificationConfig) -> Self {
        Self { config }
    }

    /// Rectify in the configured mode.
    ///
    /// Uncalibrated mode uses every corner of the paired observations as
    /// correspondences.
    pub fn rectify(
        &self,
        calibration: &StereoCalibration,
        observations1: &[Observation],
        observations2: &[Observation],
    ) -> Result<StereoRectification, StereoError> {
        match self.config.mode {
            RectificationMode::Calibrated => self.calibrated(calibration),
            RectificationMode::Uncalibrated => {
                let (p1, p2) = paired_corners(observations1, observations2, Stage::Rectification)?;
                self.uncalibrated(calibration, &p1, &p2)
            }
        }
    }

    /// Rotation split of the calibrated rig.
    pub fn calibrated(&self, calibration: &StereoCalibration) -> Result<StereoRectification, StereoError> {
        let geo = &calibration.geometry;
        let rect = stereo_rectify(
            &calibration.camera1,
            &calibration.camera2,
            &geo.rotation,
            &geo.translation,
            calibration.image_size,
        )?;
        info!(
            "calibrated rectification: f={:.2} baseline={:.4}{}",
            rect.focal(),
            rect.baseline(),
            if rect.vertical { " (vertical)" } else { "" }
        );
        let (left, right) = build_maps(
            &calibration.camera1,
            &calibration.camera2,
            (&rect.r1, &rect.p1),
            (&rect.r2, &rect.p2),
            calibration.image_size,
        )?;
        Ok(StereoRectification {
            mode: RectificationMode::Calibrated,
            left,
            right,
            q: Some(rect.q),
            homographies: None,
            interpolation: self.config.interpolation,
        })
    }

    /// Projective rectification from raw (distorted) pixel correspondences.
    ///
    /// Points are undistorted with the calibrated cameras, so `F` and the
    /// homographies live in ideal pixel coordinates and the maps undo the
    /// lens distortion.
    pub fn uncalibrated(
        &self,
        calibration: &StereoCalibration,
        points1: &[Pt2],
        points2: &[Pt2],
    ) -> Result<StereoRectification, StereoError> {
        let cam1 = &calibration.camera1;
        let cam2 = &calibration.camera2;
        let u1 = cam1.undistort_pixels(points1);
        let u2 = cam2.undistort_pixels(points2);
        let rect = rectify_uncalibrated(
            &u1,
            &u2,
            &calibration.geometry.fundamental,
            calibration.image_size,
            self.config.threshold,
        )?;
        debug!(
            "uncalibrated rectification kept {} of {} correspondences",
            rect.inliers,
            u1.len()
        );

        // The chosen intrinsics only shape `R`; each map projects with its own camera's K.
        let (k1, k2) = match self.config.homography_intrinsics {
            HomographyIntrinsics::PerCamera => (cam1.k, cam2.k),
            HomographyIntrinsics::FirstCamera => (cam1.k, cam1.k),
        };
        let r1 = rotation_from_homography(&rect.h1, &k1);
        let r2 = rotation_from_homography(&rect.h2, &k2);
        let p1 = projection_from_k(&cam1.k_matrix());
        let p2 = projection_from_k(&cam2.k_matrix());
        let (left, right) = build_maps(cam1, cam2, (&r1, &p1), (&r2, &p2), calibration.image_size)?;
        Ok(StereoRectification {
            mode: RectificationMode::Uncalibrated,
            left,
            right,
            q: None,
            homographies: Some((rect.h1, rect.h2)),
            interpolation: self.config.interpolation,
        })
    }
}
