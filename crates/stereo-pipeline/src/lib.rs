//! Stereo calibration pipeline.
//!
//! Stages, leaf first:
//! - [`IntrinsicCalibrator`]: Zhang initialisation and LM refinement per camera;
//! - [`StereoCalibrator`]: joint refinement of both cameras and the rig,
//!   producing `R, T, E, F`;
//! - [`EpipolarValidator`]: mean point-to-epiline distance;
//! - [`RectificationEngine`]: calibrated or uncalibrated rectification maps;
//! - disparity through [`stereo_match`].
//!
//! [`StereoSession`] chains them for raw image pairs, and
//! [`CalibrationRecord`] persists the result as JSON.

mod config;
mod debug;
mod error;
mod intrinsics;
mod record;
mod rectify;
mod session;
mod stereo;
mod validate;

pub use config::{
    HomographyIntrinsics, Interpolation, PipelineConfig, RectificationConfig, RectificationMode,
};
pub use debug::{CameraSide, DebugSink, LogSink, NoopSink};
pub use error::{Stage, StereoError};
pub use intrinsics::{initial_camera, IntrinsicCalibrator, IntrinsicsCalibration};
pub use record::CalibrationRecord;
pub use rectify::{
    init_undistort_rectify_map, remap, RectificationEngine, RectifyMap, StereoRectification,
};
pub use session::{DetectedPairs, FrameOutput, SessionCalibration, StereoSession};
pub use stereo::{StereoCalibration, StereoCalibrator, StereoGeometry};
pub use validate::{epipolar_score, EpipolarValidator};

pub use stereo_detect::{DetectorParams, PatternDetector};
pub use stereo_match::{DisparityEngine, DisparityMap, SgbmMode, SgbmParams};
pub use stereo_optim::{IntrinsicsSolveOptions, SolveOptions, SolveStatus, StereoSolveOptions};
