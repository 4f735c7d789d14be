//! Rectification geometry.
//!
//! Two constructions feed the same map builder downstream:
//! - [`stereo_rectify`]: calibrated rotation split of the relative pose, with
//!   a common projection matrix for both rectified views;
//! - [`rectify_uncalibrated`]: projective rectification from correspondences
//!   and a fundamental matrix, converted to rotations with
//!   [`rotation_from_homography`].

mod calibrated;
mod uncalibrated;

pub use calibrated::{stereo_rectify, CalibratedRectification};
pub use uncalibrated::{rectify_uncalibrated, rotation_from_homography, UncalibratedRectification};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RectifyError {
    #[error("need at least {required} inlier correspondences, got {got}")]
    NotEnoughInliers { required: usize, got: usize },
    #[error("correspondence count mismatch: {0} vs {1}")]
    CountMismatch(usize, usize),
    #[error("degenerate epipole: {0}")]
    DegenerateEpipole(&'static str),
    #[error("baseline has zero length")]
    ZeroBaseline,
    #[error("linear system is singular: {0}")]
    Singular(&'static str),
    #[error("svd failed")]
    SvdFailed,
}
