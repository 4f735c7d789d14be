use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("board must have at least 2x2 interior corners, got {width}x{height}")]
    InvalidBoard { width: usize, height: usize },
    #[error("checkerboard {width}x{height} not found: {reason}")]
    PatternNotFound {
        width: usize,
        height: usize,
        reason: String,
    },
}
