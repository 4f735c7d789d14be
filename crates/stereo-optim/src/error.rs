use thiserror::Error;

/// Failures of the calibration refinement stages.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("need at least {required} views, got {got}")]
    InsufficientViews { required: usize, got: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("observation sets do not match: {0}")]
    MismatchedObservationSets(String),
}
