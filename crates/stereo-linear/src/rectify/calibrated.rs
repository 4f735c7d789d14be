use super::RectifyError;
use nalgebra::{Rotation3, Vector2};
use stereo_core::{ImageSize, Mat3, Mat34, Mat4, PinholeCamera, Pt2, Real, Vec3};

/// Output of [`stereo_rectify`].
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedRectification {
    /// Rotation from camera-1 to rectified camera-1 coordinates.
    pub r1: Mat3,
    /// Rotation from camera-2 to rectified camera-2 coordinates.
    pub r2: Mat3,
    /// Projection of the rectified camera 1 (`[K_new | 0]`).
    pub p1: Mat34,
    /// Projection of the rectified camera 2 (`[K_new | K_new·(Tx, 0, 0)ᵀ]`
    /// for horizontal rigs).
    pub p2: Mat34,
    /// Disparity-to-depth matrix: `Q·(x, y, d, 1)ᵀ ~ (X, Y, Z, 1)ᵀ`.
    pub q: Mat4,
    /// `true` when the baseline was aligned with the image y-axis.
    pub vertical: bool,
}

impl CalibratedRectification {
    /// Common focal length of the rectified views.
    pub fn focal(&self) -> Real {
        self.p1[(0, 0)]
    }

    /// Baseline length along the rectified axis (signed, camera-2 frame).
    pub fn baseline(&self) -> Real {
        let idx = if self.vertical { 1 } else { 0 };
        self.p2[(idx, 3)] / self.focal()
    }
}

/// Calibrated rectification for a rig with `X2 = R·X1 + T`.
///
/// The relative rotation is split in half between the two views, then a
/// common rotation aligns the baseline with the x-axis (or the y-axis when
/// `|Ty| > |Tx|`). Both rectified views share the focal length (smallest
/// focal along the non-baseline axis, shrunk for barrel distortion) and the
/// principal point, so points at infinity have zero disparity.
pub fn stereo_rectify(
    camera1: &PinholeCamera,
    camera2: &PinholeCamera,
    r: &Mat3,
    t: &Vec3,
    image_size: ImageSize,
) -> Result<CalibratedRectification, RectifyError> {
    if t.norm() <= Real::EPSILON {
        return Err(RectifyError::ZeroBaseline);
    }

    let rot = Rotation3::from_matrix_eps(r, 1e-12, 100, Rotation3::identity());
    let om = rot.scaled_axis();
    let r_half = Rotation3::new(-0.5 * om);
    let t_half = r_half * t;

    let idx = if t_half.x.abs() > t_half.y.abs() { 0 } else { 1 };
    let c = t_half[idx];
    let mut uu = Vec3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };

    let mut ww = t_half.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / t_half.norm()).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = Rotation3::new(ww);

    let r1 = (w_r * r_half.inverse()).into_inner();
    let r2 = (w_r * r_half).into_inner();
    let t_new = r2 * t;

    let nx = image_size.width as Real;
    let ny = image_size.height as Real;
    let mut fc_new = Real::MAX;
    for cam in [camera1, camera2] {
        let mut fc = if idx == 0 { cam.k.fy } else { cam.k.fx };
        let dk1 = cam.dist.k1;
        if dk1 < 0.0 {
            fc *= 1.0 + dk1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
        }
        fc_new = fc_new.min(fc);
    }

    let cc1 = principal_point_for(camera1, &r1, fc_new, image_size);
    let cc2 = principal_point_for(camera2, &r2, fc_new, image_size);
    let cc = 0.5 * (cc1 + cc2);

    let mut p1 = Mat34::zeros();
    p1[(0, 0)] = fc_new;
    p1[(1, 1)] = fc_new;
    p1[(0, 2)] = cc.x;
    p1[(1, 2)] = cc.y;
    p1[(2, 2)] = 1.0;
    let mut p2 = p1;
    p2[(idx, 3)] = t_new[idx] * fc_new;

    let tx = t_new[idx];
    let mut q = Mat4::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cc.x;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cc.y;
    q[(2, 3)] = fc_new;
    q[(3, 2)] = -1.0 / tx;

    log::debug!(
        "calibrated rectification: f={fc_new:.3} c=({:.3}, {:.3}) baseline {tx:.5} ({})",
        cc.x,
        cc.y,
        if idx == 0 { "horizontal" } else { "vertical" }
    );

    Ok(CalibratedRectification {
        r1,
        r2,
        p1,
        p2,
        q,
        vertical: idx == 1,
    })
}

/// Principal point that centers the rectified image corners of one camera.
fn principal_point_for(
    camera: &PinholeCamera,
    r: &Mat3,
    f: Real,
    size: ImageSize,
) -> Vector2<Real> {
    let w = size.width.saturating_sub(1) as Real;
    let h = size.height.saturating_sub(1) as Real;
    let corners = [
        Pt2::new(0.0, 0.0),
        Pt2::new(w, 0.0),
        Pt2::new(0.0, h),
        Pt2::new(w, h),
    ];

    let mut sum = Vector2::zeros();
    let mut count = 0usize;
    for px in &corners {
        let ray = r * camera.backproject_pixel(px);
        if ray.z <= Real::EPSILON {
            continue;
        }
        sum += Vector2::new(f * ray.x / ray.z, f * ray.y / ray.z);
        count += 1;
    }
    let avg = if count > 0 {
        sum / count as Real
    } else {
        Vector2::zeros()
    };
    Vector2::new(0.5 * w - avg.x, 0.5 * h - avg.y)
}
