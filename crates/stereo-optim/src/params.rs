//! Parameter-vector layouts.
//!
//! A camera contributes up to nine slots `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`;
//! [`CameraBlock`] keeps only the free ones in the optimization vector and
//! restores the fixed ones from a template. Poses are six slots: the
//! scaled-axis rotation followed by the translation.

use nalgebra::{DVector, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use stereo_core::{BrownConrady5, FxFyCxCySkew, Iso3, PinholeCamera, Real};

pub const CAMERA_SLOTS: usize = 9;
pub const POSE_DIM: usize = 6;

const FX: usize = 0;
const FY: usize = 1;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;

/// Which camera parameters stay fixed during a refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsMask {
    /// Keep every intrinsic and distortion parameter at its initial value.
    pub fix_intrinsics: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Keep `k3` at its initial value.
    pub fix_k3: bool,
    /// Take `fx, fy` from another camera instead of optimizing them.
    pub borrow_focal: bool,
}

/// Free/fixed split of one camera's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraBlock {
    template: [Real; CAMERA_SLOTS],
    free: Vec<usize>,
    undistort_iters: u32,
}

impl CameraBlock {
    pub fn new(camera: &PinholeCamera, mask: IntrinsicsMask) -> Self {
        let mut template = camera_to_slots(camera);
        // Fixed intrinsics are used exactly as supplied.
        if mask.zero_tangent_dist && !mask.fix_intrinsics {
            template[P1] = 0.0;
            template[P2] = 0.0;
        }
        let free = if mask.fix_intrinsics {
            Vec::new()
        } else {
            (0..CAMERA_SLOTS)
                .filter(|&s| !(mask.borrow_focal && (s == FX || s == FY)))
                .filter(|&s| !(mask.zero_tangent_dist && (s == P1 || s == P2)))
                .filter(|&s| !(mask.fix_k3 && s == K3))
                .collect()
        };
        Self {
            template,
            free,
            undistort_iters: camera.dist.iters,
        }
    }

    /// Number of slots this block occupies in the parameter vector.
    pub fn dim(&self) -> usize {
        self.free.len()
    }

    pub fn pack(&self, out: &mut Vec<Real>) {
        out.extend(self.free.iter().map(|&s| self.template[s]));
    }

    /// Rebuild the camera from `x[offset..offset + dim]`.
    ///
    /// `focal` overrides `fx, fy` (shared focal length between two cameras).
    pub fn decode(&self, x: &DVector<Real>, offset: usize, focal: Option<(Real, Real)>) -> PinholeCamera {
        let mut slots = self.template;
        for (i, &s) in self.free.iter().enumerate() {
            slots[s] = x[offset + i];
        }
        if let Some((fx, fy)) = focal {
            slots[FX] = fx;
            slots[FY] = fy;
        }
        slots_to_camera(&slots, self.undistort_iters)
    }
}

fn camera_to_slots(camera: &PinholeCamera) -> [Real; CAMERA_SLOTS] {
    let k = camera.k;
    let d = camera.dist;
    [k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3]
}

fn slots_to_camera(s: &[Real; CAMERA_SLOTS], iters: u32) -> PinholeCamera {
    let mut dist = BrownConrady5::from_coeffs([s[4], s[5], s[6], s[7], s[8]]);
    dist.iters = iters;
    PinholeCamera::new(FxFyCxCySkew::new(s[0], s[1], s[2], s[3]), dist)
}

pub fn pack_pose(pose: &Iso3, out: &mut Vec<Real>) {
    let w = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    out.extend_from_slice(&[w.x, w.y, w.z, t.x, t.y, t.z]);
}

pub fn decode_pose(x: &DVector<Real>, offset: usize) -> Iso3 {
    let w = Vector3::new(x[offset], x[offset + 1], x[offset + 2]);
    let t = Vector3::new(x[offset + 3], x[offset + 4], x[offset + 5]);
    Iso3::from_parts(Translation3::from(t), UnitQuaternion::from_scaled_axis(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(
            FxFyCxCySkew::new(800.0, 790.0, 320.0, 240.0),
            BrownConrady5::from_coeffs([-0.2, 0.05, 0.001, -0.002, 0.01]),
        )
    }

    #[test]
    fn full_block_roundtrips() {
        let block = CameraBlock::new(&camera(), IntrinsicsMask::default());
        assert_eq!(block.dim(), 9);
        let mut v = Vec::new();
        block.pack(&mut v);
        let cam = block.decode(&DVector::from_vec(v), 0, None);
        assert_eq!(cam, camera());
    }

    #[test]
    fn mask_drops_slots_and_zeroes_tangential() {
        let mask = IntrinsicsMask {
            zero_tangent_dist: true,
            fix_k3: true,
            borrow_focal: true,
            ..IntrinsicsMask::default()
        };
        let block = CameraBlock::new(&camera(), mask);
        assert_eq!(block.dim(), 4); // cx, cy, k1, k2

        let x = DVector::from_vec(vec![330.0, 250.0, -0.1, 0.02]);
        let cam = block.decode(&x, 0, Some((700.0, 705.0)));
        assert_eq!(cam.k.fx, 700.0);
        assert_eq!(cam.k.cx, 330.0);
        assert_eq!(cam.dist.p1, 0.0);
        assert_eq!(cam.dist.p2, 0.0);
        assert_eq!(cam.dist.k3, 0.01);
    }

    #[test]
    fn fixed_intrinsics_have_no_slots() {
        let block = CameraBlock::new(
            &camera(),
            IntrinsicsMask {
                fix_intrinsics: true,
                ..IntrinsicsMask::default()
            },
        );
        assert_eq!(block.dim(), 0);
        assert_eq!(block.decode(&DVector::zeros(0), 0, None), camera());
    }

    #[test]
    fn fixed_intrinsics_keep_tangential_terms() {
        let block = CameraBlock::new(
            &camera(),
            IntrinsicsMask {
                fix_intrinsics: true,
                zero_tangent_dist: true,
                fix_k3: true,
                borrow_focal: false,
            },
        );
        let cam = block.decode(&DVector::zeros(0), 0, None);
        assert_eq!(cam.dist.p1, 0.001);
        assert_eq!(cam.dist.p2, -0.002);
        assert_eq!(cam, camera());
    }

    #[test]
    fn pose_roundtrip() {
        let pose = Iso3::from_parts(
            Translation3::new(0.1, -0.2, 3.0),
            UnitQuaternion::from_euler_angles(0.3, -0.1, 0.2),
        );
        let mut v = Vec::new();
        pack_pose(&pose, &mut v);
        let back = decode_pose(&DVector::from_vec(v), 0);
        assert!((back.translation.vector - pose.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-12);
    }
}
