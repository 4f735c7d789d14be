//! Serde-backed configuration for the whole pipeline.
//!
//! Every section defaults independently, so a JSON file only needs to list
//! the values it changes.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use stereo_core::{PatternGeometry, Real};
use stereo_detect::DetectorParams;
use stereo_match::SgbmParams;
use stereo_optim::{IntrinsicsSolveOptions, StereoSolveOptions};

/// How the rectifying transforms are obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectificationMode {
    /// Rotations and projections from the calibrated rig.
    Calibrated,
    /// Homographies from correspondences and `F`.
    #[default]
    Uncalibrated,
}

/// Which intrinsics turn uncalibrated homographies into rotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomographyIntrinsics {
    /// `R_i = K_i⁻¹·H_i·K_i` for each camera.
    #[default]
    PerCamera,
    /// Camera 1's `K` in both rotations; each map still projects with its
    /// own camera's `K`.
    FirstCamera,
}

/// Sampling used by [`crate::remap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectificationConfig {
    pub mode: RectificationMode,
    /// Epipolar distance (px) above which correspondences are dropped in
    /// uncalibrated mode; `<= 0` keeps all of them.
    pub threshold: Real,
    pub homography_intrinsics: HomographyIntrinsics,
    pub interpolation: Interpolation,
}

impl Default for RectificationConfig {
    fn default() -> Self {
        Self {
            mode: RectificationMode::Uncalibrated,
            threshold: 3.0,
            homography_intrinsics: HomographyIntrinsics::PerCamera,
            interpolation: Interpolation::Bilinear,
        }
    }
}

fn default_pattern() -> PatternGeometry {
    PatternGeometry::new(6, 9)
}

/// Aggregated settings of a [`crate::StereoSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pattern: PatternGeometry,
    pub detector: DetectorParams,
    pub intrinsics: IntrinsicsSolveOptions,
    pub stereo: StereoSolveOptions,
    pub rectification: RectificationConfig,
    pub disparity: SgbmParams,
    /// Forward intermediate results to the debug sink.
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            detector: DetectorParams::default(),
            intrinsics: IntrinsicsSolveOptions::default(),
            stereo: StereoSolveOptions::default(),
            rectification: RectificationConfig::default(),
            disparity: SgbmParams::default(),
            debug: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).context("failed to parse pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.pattern.board_width >= 2 && self.pattern.board_height >= 2,
            "board must have at least 2x2 interior corners, got {}x{}",
            self.pattern.board_width,
            self.pattern.board_height
        );
        ensure!(
            self.pattern.square_size > 0.0,
            "square_size must be positive, got {}",
            self.pattern.square_size
        );
        self.disparity.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_classic_setup() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.pattern, PatternGeometry::new(6, 9));
        assert_eq!(cfg.rectification.mode, RectificationMode::Uncalibrated);
        assert_eq!(cfg.rectification.threshold, 3.0);
        assert!(cfg.stereo.same_focal_length);
        assert!(cfg.stereo.zero_tangent_dist);
        assert_eq!(cfg.disparity.num_disparities, 128);
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let cfg = PipelineConfig::from_json_str(
            r#"{
                "pattern": {"board_width": 7, "board_height": 5, "square_size": 0.025},
                "rectification": {"mode": "calibrated"},
                "disparity": {"mode": "reduced", "num_disparities": 64}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.pattern.board_width, 7);
        assert_eq!(cfg.rectification.mode, RectificationMode::Calibrated);
        assert_eq!(cfg.rectification.threshold, 3.0);
        assert_eq!(cfg.disparity.num_disparities, 64);
        assert_eq!(cfg.disparity.block_size, 11);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::from_json_str(r#"{"disparity": {"block_size": 4}}"#).is_err());
        assert!(
            PipelineConfig::from_json_str(r#"{"pattern": {"board_width": 1, "board_height": 5}}"#)
                .is_err()
        );
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut cfg = PipelineConfig::default();
        cfg.debug = true;
        cfg.to_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), cfg);
    }
}
