//! Linear and closed-form solvers for stereo calibration.
//!
//! Everything here is deterministic and allocation-light: DLT homographies,
//! Zhang's intrinsics initialisation, planar pose recovery, epipolar
//! geometry helpers and the two rectification constructions (calibrated
//! rotation split and uncalibrated projective rectification).
//!
//! The results are meant as starting points for the nonlinear refinement in
//! `stereo-optim` or as final geometry when the refinement is already done.

pub mod epipolar;
mod homography;
pub mod math;
mod planar_pose;
pub mod rectify;
mod zhang_intrinsics;

pub use epipolar::{
    compute_correspond_epilines, epipolar_distance, essential_from_pose, fundamental_8point,
    fundamental_from_essential, normalize_fundamental, EpilineImage, EpipolarError,
};
pub use homography::*;
pub use planar_pose::*;
pub use rectify::{
    rectify_uncalibrated, rotation_from_homography, stereo_rectify, CalibratedRectification,
    RectifyError, UncalibratedRectification,
};
pub use zhang_intrinsics::*;
