use crate::error::DisparityError;
use serde::{Deserialize, Serialize};

/// Aggregation strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgbmMode {
    /// Eight paths over the whole cost volume.
    #[default]
    Full,
    /// Four forward paths plus the in-row backward path; one row of costs in memory.
    Reduced,
}

/// Largest `|disparity|` whose ×16 fixed-point value stays clear of
/// [`crate::DisparityMap::INVALID`].
pub const DISPARITY_LIMIT: i32 = 2047;

/// Largest accepted `p2`; keeps eight summed path costs inside `u32`.
pub const MAX_PENALTY: u32 = 1 << 24;

/// Semi-global block matching parameters.
///
/// Costs are Birchfield–Tomasi differences summed over a `block_size²`
/// window, so `p1`/`p2` scale with the block area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgbmParams {
    pub min_disparity: i32,
    /// Size of the searched range, `> 0`.
    pub num_disparities: i32,
    /// Odd matching window side.
    pub block_size: u32,
    /// Penalty for a disparity change of one between neighbours.
    pub p1: u32,
    /// Penalty for larger changes; must exceed `p1`.
    pub p2: u32,
    /// Left–right check tolerance in pixels; negative disables the check.
    pub disp12_max_diff: i32,
    /// Clip of the horizontal-gradient prefilter; 0 matches raw intensities.
    pub pre_filter_cap: u32,
    /// Percentage margin the best cost must win by.
    pub uniqueness_ratio: u32,
    /// Largest blob (pixels) removed by the speckle filter; 0 disables it.
    pub speckle_window_size: u32,
    /// Max disparity step (pixels) inside one connected region.
    pub speckle_range: u32,
    pub mode: SgbmMode,
}

impl Default for SgbmParams {
    fn default() -> Self {
        Self {
            min_disparity: -64,
            num_disparities: 128,
            block_size: 11,
            p1: 100,
            p2: 1000,
            disp12_max_diff: 32,
            pre_filter_cap: 0,
            uniqueness_ratio: 15,
            speckle_window_size: 1000,
            speckle_range: 16,
            mode: SgbmMode::Full,
        }
    }
}

impl SgbmParams {
    /// One past the largest searched disparity.
    pub fn max_disparity(&self) -> i32 {
        self.min_disparity + self.num_disparities
    }

    pub fn validate(&self) -> Result<(), DisparityError> {
        let bad = |msg: String| Err(DisparityError::InvalidParams(msg));
        if self.num_disparities <= 0 {
            return bad(format!(
                "num_disparities must be positive, got {}",
                self.num_disparities
            ));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return bad(format!("block_size must be odd, got {}", self.block_size));
        }
        if self.p2 <= self.p1 {
            return bad(format!("p2 ({}) must exceed p1 ({})", self.p2, self.p1));
        }
        if self.p2 > MAX_PENALTY {
            return bad(format!("p2 must not exceed {MAX_PENALTY}, got {}", self.p2));
        }
        let lowest = self.min_disparity;
        let highest = self.min_disparity.checked_add(self.num_disparities);
        match highest {
            Some(high) if lowest >= -DISPARITY_LIMIT && high <= DISPARITY_LIMIT => {}
            _ => {
                return bad(format!(
                    "disparity range [{lowest}, {lowest} + {}) exceeds ±{DISPARITY_LIMIT}",
                    self.num_disparities
                ))
            }
        }
        if self.uniqueness_ratio >= 100 {
            return bad(format!(
                "uniqueness_ratio must be below 100, got {}",
                self.uniqueness_ratio
            ));
        }
        Ok(())
    }
}
