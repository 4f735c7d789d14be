//! End-to-end stereo session: detection, calibration, validation,
//! rectification and per-frame disparity.

use image::GrayImage;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Observation, Real};
use stereo_detect::{DetectError, PatternDetector};
use stereo_match::DisparityMap;

use crate::config::PipelineConfig;
use crate::debug::{CameraSide, DebugSink, LogSink};
use crate::error::{Stage, StereoError};
use crate::intrinsics::{IntrinsicCalibrator, IntrinsicsCalibration};
use crate::record::CalibrationRecord;
use crate::rectify::{RectificationEngine, StereoRectification};
use crate::stereo::{StereoCalibration, StereoCalibrator};
use crate::validate::EpipolarValidator;

/// Observations of the pairs where both detections succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedPairs {
    /// Input index of every kept pair.
    pub frames: Vec<usize>,
    pub observations1: Vec<Observation>,
    pub observations2: Vec<Observation>,
}

/// Everything a session learns from its calibration pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCalibration {
    pub detections: DetectedPairs,
    pub intrinsics1: IntrinsicsCalibration,
    pub intrinsics2: IntrinsicsCalibration,
    pub stereo: StereoCalibration,
    /// Mean epipolar error on the calibration corners (px).
    pub epipolar_error: Real,
    pub rectification: StereoRectification,
}

impl SessionCalibration {
    pub fn record(&self) -> CalibrationRecord {
        CalibrationRecord::from(&self.stereo)
    }
}

/// Rectified pair and its disparity.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub left: GrayImage,
    pub right: GrayImage,
    pub disparity: DisparityMap,
}

/// Drives the whole pipeline with one [`PipelineConfig`].
pub struct StereoSession {
    pub config: PipelineConfig,
    sink: Option<Box<dyn DebugSink>>,
}

impl StereoSession {
    pub fn new(config: PipelineConfig) -> Self {
        let sink: Option<Box<dyn DebugSink>> = if config.debug {
            Some(Box::new(LogSink))
        } else {
            None
        };
        Self { config, sink }
    }

    pub fn with_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn sink(&self) -> Option<&dyn DebugSink> {
        self.sink.as_deref()
    }

    /// Detect the board in every pair, dropping pairs where either side fails.
    pub fn detect_pairs(&self, pairs: &[(GrayImage, GrayImage)]) -> DetectedPairs {
        let detector = PatternDetector::new(self.config.detector.clone());
        let pattern = &self.config.pattern;
        let results: Vec<(Result<Observation, DetectError>, Result<Observation, DetectError>)> = pairs
            .par_iter()
            .map(|(l, r)| {
                rayon::join(
                    || detector.detect_observation(l, pattern),
                    || detector.detect_observation(r, pattern),
                )
            })
            .collect();

        let mut out = DetectedPairs::default();
        for (frame, ((left, right), (img_l, img_r))) in results.into_iter().zip(pairs).enumerate() {
            match (left, right) {
                (Ok(a), Ok(b)) => {
                    if let Some(sink) = self.sink() {
                        sink.corners(frame, CameraSide::Left, img_l, &a.points_2d);
                        sink.corners(frame, CameraSide::Right, img_r, &b.points_2d);
                    }
                    out.frames.push(frame);
                    out.observations1.push(a);
                    out.observations2.push(b);
                }
                (Err(e), _) => warn!("frame {frame}: skipping pair, left image: {e}"),
                (_, Err(e)) => warn!("frame {frame}: skipping pair, right image: {e}"),
            }
        }
        info!(
            "board found in {} of {} pairs",
            out.frames.len(),
            pairs.len()
        );
        out
    }

    /// Full calibration from raw image pairs.
    pub fn calibrate(&self, pairs: &[(GrayImage, GrayImage)]) -> Result<SessionCalibration, StereoError> {
        let Some((first, _)) = pairs.first() else {
            return Err(StereoError::InsufficientViews {
                stage: Stage::Detection,
                required: 2,
                got: 0,
            });
        };
        let size = ImageSize::new(first.width(), first.height());
        if let Some(idx) = pairs.iter().position(|(l, r)| {
            l.dimensions() != first.dimensions() || r.dimensions() != first.dimensions()
        }) {
            return Err(StereoError::InvalidInput {
                stage: Stage::Detection,
                reason: format!(
                    "pair {idx} does not match the {}x{} size of pair 0",
                    size.width, size.height
                ),
            });
        }
        let detections = self.detect_pairs(pairs);
        self.calibrate_detections(detections, size)
    }

    /// Calibration from already detected pairs.
    pub fn calibrate_detections(
        &self,
        detections: DetectedPairs,
        image_size: ImageSize,
    ) -> Result<SessionCalibration, StereoError> {
        let intrinsics = IntrinsicCalibrator::new(self.config.intrinsics);
        let (intrinsics1, intrinsics2) = rayon::join(
            || intrinsics.calibrate(&detections.observations1, image_size),
            || intrinsics.calibrate(&detections.observations2, image_size),
        );
        let (intrinsics1, intrinsics2) = (intrinsics1?, intrinsics2?);

        let stereo = StereoCalibrator::new(self.config.stereo).calibrate_pair(
            &detections.observations1,
            &detections.observations2,
            &intrinsics1.camera,
            &intrinsics2.camera,
            image_size,
        )?;

        let epipolar_error =
            EpipolarValidator.score(&detections.observations1, &detections.observations2, &stereo)?;
        info!("average epipolar error: {epipolar_error:.4} px");
        if let Some(sink) = self.sink() {
            sink.epipolar_score(epipolar_error);
        }

        let rectification = RectificationEngine::new(self.config.rectification.clone()).rectify(
            &stereo,
            &detections.observations1,
            &detections.observations2,
        )?;

        Ok(SessionCalibration {
            detections,
            intrinsics1,
            intrinsics2,
            stereo,
            epipolar_error,
            rectification,
        })
    }

    /// Rectify a raw pair and compute its disparity.
    pub fn process_pair(
        &self,
        rectification: &StereoRectification,
        frame: usize,
        left: &GrayImage,
        right: &GrayImage,
    ) -> Result<FrameOutput, StereoError> {
        let (left, right) = rectification.rectify_pair(left, right);
        if let Some(sink) = self.sink() {
            sink.rectified_pair(frame, &left, &right);
        }
        let disparity = stereo_match::compute(&left, &right, &self.config.disparity)?;
        Ok(FrameOutput {
            left,
            right,
            disparity,
        })
    }
}
