use serde::{Deserialize, Serialize};

/// Tunables of the checkerboard detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Candidates below `threshold_rel * max_response` are discarded.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: u32,
    /// Images whose intensity range is below this are rejected outright.
    pub min_contrast: f32,
    /// Allowed distance between a predicted and an accepted grid node, as a
    /// fraction of the local grid step.
    pub grid_tolerance: f64,
    /// Half size of the subpixel refinement window (`2·h + 1` pixels wide).
    pub refine_half_window: u32,
    /// Stop refining once the update is below this (pixels).
    pub refine_epsilon: f64,
    pub refine_max_iters: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.1,
            nms_radius: 3,
            min_contrast: 20.0,
            grid_tolerance: 0.35,
            refine_half_window: 5,
            refine_epsilon: 1e-3,
            refine_max_iters: 40,
        }
    }
}
