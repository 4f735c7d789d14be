//! Non-linear refinement for stereo calibration.
//!
//! The crate is organised around one reusable abstraction, [`NllsProblem`]
//! (residuals plus a Jacobian with a finite-difference default), solved by
//! the Levenberg–Marquardt backend in [`backend_lm`]. Two problems are built
//! on it:
//! - [`problems::planar_intrinsics`]: one camera, per-view board poses;
//! - [`problems::stereo`]: two cameras, the rig transform and per-view board
//!   poses expressed in camera 1.

pub mod backend_lm;
mod error;
pub mod params;
pub mod problems;
mod traits;

pub use backend_lm::LmBackend;
pub use error::CalibrationError;
pub use problems::planar_intrinsics::{
    optimize_planar_intrinsics, IntrinsicsSolveOptions, PlanarIntrinsicsEstimate,
    PlanarIntrinsicsProblem,
};
pub use problems::stereo::{optimize_stereo, StereoEstimate, StereoProblem, StereoSolveOptions};
pub use problems::{reprojection_rms, view_reprojection_rms};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport, SolveStatus};
