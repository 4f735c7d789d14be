use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Mat3, PinholeCamera, Real, Vec3};

use crate::stereo::{StereoCalibration, StereoGeometry};

/// Persisted stereo calibration.
///
/// Stored as JSON with named fields, so field order does not matter on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub camera1: PinholeCamera,
    pub camera2: PinholeCamera,
    pub rotation: Mat3,
    pub translation: Vec3,
    pub essential: Mat3,
    pub fundamental: Mat3,
    pub image_size: ImageSize,
    pub rms: Real,
}

impl From<&StereoCalibration> for CalibrationRecord {
    fn from(c: &StereoCalibration) -> Self {
        Self {
            camera1: c.camera1,
            camera2: c.camera2,
            rotation: c.geometry.rotation,
            translation: c.geometry.translation,
            essential: c.geometry.essential,
            fundamental: c.geometry.fundamental,
            image_size: c.image_size,
            rms: c.rms,
        }
    }
}

impl CalibrationRecord {
    pub fn geometry(&self) -> StereoGeometry {
        StereoGeometry {
            rotation: self.rotation,
            translation: self.translation,
            essential: self.essential,
            fundamental: self.fundamental,
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("failed to serialize calibration")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write calibration {}", path.display()))
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read calibration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse calibration {}", path.display()))
    }
}
