//! Camera model building blocks.
//!
//! The model has three stages:
//!
//! 1. pinhole projection of a camera-frame point onto the `z = 1` plane,
//! 2. Brown–Conrady radial/tangential distortion in normalized coordinates,
//! 3. the intrinsic matrix `K` mapping normalized coordinates to pixels.
//!
//! All parameter structs derive `serde` so calibration results can be stored
//! as flat records of named fields.

mod camera;
mod distortion;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
