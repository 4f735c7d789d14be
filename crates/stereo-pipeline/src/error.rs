use std::fmt;

use stereo_detect::DetectError;
use stereo_linear::{HomographyError, IntrinsicsInitError, PoseInitError, RectifyError};
use stereo_match::DisparityError;
use stereo_optim::CalibrationError;
use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Intrinsics,
    Stereo,
    Rectification,
    Disparity,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detection => "detection",
            Stage::Intrinsics => "intrinsic calibration",
            Stage::Stereo => "stereo calibration",
            Stage::Rectification => "rectification",
            Stage::Disparity => "disparity",
        };
        f.write_str(name)
    }
}

/// Errors of the stereo pipeline.
///
/// Non-convergence of a solver is not an error: it is reported as
/// [`stereo_optim::SolveStatus::DidNotConverge`] on a successful result.
#[derive(Debug, Error)]
pub enum StereoError {
    #[error("detection: {0}")]
    PatternNotFound(#[from] DetectError),
    #[error("{stage}: degenerate geometry: {reason}")]
    DegenerateGeometry { stage: Stage, reason: String },
    #[error("{stage}: need at least {required} views, got {got}")]
    InsufficientViews {
        stage: Stage,
        required: usize,
        got: usize,
    },
    #[error("{stage}: observation sets do not match: {reason}")]
    MismatchedObservationSets { stage: Stage, reason: String },
    #[error("rectification failed: {0}")]
    RectificationFailure(#[from] RectifyError),
    #[error("disparity: {0}")]
    Disparity(#[from] DisparityError),
    #[error("{stage}: invalid input: {reason}")]
    InvalidInput { stage: Stage, reason: String },
}

impl StereoError {
    pub fn stage(&self) -> Stage {
        match self {
            StereoError::PatternNotFound(_) => Stage::Detection,
            StereoError::DegenerateGeometry { stage, .. }
            | StereoError::InsufficientViews { stage, .. }
            | StereoError::MismatchedObservationSets { stage, .. }
            | StereoError::InvalidInput { stage, .. } => *stage,
            StereoError::RectificationFailure(_) => Stage::Rectification,
            StereoError::Disparity(_) => Stage::Disparity,
        }
    }

    pub(crate) fn calibration(stage: Stage, err: CalibrationError) -> Self {
        match err {
            CalibrationError::InsufficientViews { required, got } => {
                StereoError::InsufficientViews {
                    stage,
                    required,
                    got,
                }
            }
            CalibrationError::DegenerateGeometry(reason) => {
                StereoError::DegenerateGeometry { stage, reason }
            }
            CalibrationError::MismatchedObservationSets(reason) => {
                StereoError::MismatchedObservationSets { stage, reason }
            }
        }
    }

    pub(crate) fn degenerate(stage: Stage, reason: impl Into<String>) -> Self {
        StereoError::DegenerateGeometry {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn homography(stage: Stage, view: usize, err: HomographyError) -> Self {
        Self::degenerate(stage, format!("homography of view {view}: {err}"))
    }

    pub(crate) fn pose_init(stage: Stage, view: usize, err: PoseInitError) -> Self {
        Self::degenerate(stage, format!("pose of view {view}: {err}"))
    }

    pub(crate) fn intrinsics_init(err: IntrinsicsInitError) -> Self {
        match err {
            IntrinsicsInitError::NotEnoughHomographies { required, got } => {
                StereoError::InsufficientViews {
                    stage: Stage::Intrinsics,
                    required,
                    got,
                }
            }
            other => Self::degenerate(Stage::Intrinsics, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = StereoError::calibration(
            Stage::Stereo,
            CalibrationError::InsufficientViews {
                required: 2,
                got: 1,
            },
        );
        assert_eq!(err.stage(), Stage::Stereo);
        assert_eq!(
            err.to_string(),
            "stereo calibration: need at least 2 views, got 1"
        );
    }
}
