//! Optional observers for intermediate results.
//!
//! The pipeline only calls these hooks; it never reads anything back, so a
//! session behaves identically with or without a sink.

use image::GrayImage;
use log::{debug, info};
use stereo_core::{Pt2, Real};

/// Which camera of the pair an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSide {
    Left,
    Right,
}

/// Receiver of intermediate pipeline outputs. Every hook defaults to a no-op.
pub trait DebugSink: Send + Sync {
    /// Corners found in frame `frame`.
    fn corners(&self, _frame: usize, _side: CameraSide, _image: &GrayImage, _corners: &[Pt2]) {}

    fn epipolar_score(&self, _score: Real) {}

    fn rectified_pair(&self, _frame: usize, _left: &GrayImage, _right: &GrayImage) {}
}

/// Sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DebugSink for NoopSink {}

/// Sink that reports through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DebugSink for LogSink {
    fn corners(&self, frame: usize, side: CameraSide, _image: &GrayImage, corners: &[Pt2]) {
        if let Some(first) = corners.first() {
            info!(
                "frame {frame} {side:?}: {} corners, first at ({:.2}, {:.2})",
                corners.len(),
                first.x,
                first.y
            );
        }
    }

    fn epipolar_score(&self, score: Real) {
        debug!("epipolar score reported: {score:.4} px");
    }

    fn rectified_pair(&self, frame: usize, left: &GrayImage, _right: &GrayImage) {
        info!(
            "frame {frame}: rectified {}x{} pair",
            left.width(),
            left.height()
        );
    }
}
