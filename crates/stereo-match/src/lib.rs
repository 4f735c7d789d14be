//! Semi-global block matching on rectified stereo pairs.
//!
//! [`compute`] runs the whole chain:
//! 1. optional horizontal-gradient prefilter;
//! 2. Birchfield–Tomasi costs summed over `block_size²` windows;
//! 3. path aggregation ([`SgbmMode::Full`]: 8 paths over the whole cost
//!    volume, [`SgbmMode::Reduced`]: 5 single-pass paths, one row in memory);
//! 4. winner selection with uniqueness check, subpixel refinement and the
//!    left–right check;
//! 5. speckle filtering.
//!
//! The output is a [`DisparityMap`] in 1/16 px fixed point. Integer
//! arithmetic throughout keeps results identical between runs and thread
//! counts.

mod aggregate;
mod cost;
mod disparity;
mod error;
mod params;
mod select;
mod speckle;

pub use disparity::{DisparityMap, DISP_SCALE, DISP_SHIFT};
pub use error::DisparityError;
pub use params::{SgbmMode, SgbmParams, DISPARITY_LIMIT, MAX_PENALTY};
pub use speckle::filter_speckles;

use aggregate::{aggregate_full, Penalties, ReducedAggregator};
use cost::CostBuilder;
use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;
use select::{select_row, Selection};

/// Disparity engine bound to one parameter set.
#[derive(Clone, Debug, Default)]
pub struct DisparityEngine {
    pub params: SgbmParams,
}

impl DisparityEngine {
    pub fn new(params: SgbmParams) -> Self {
        Self { params }
    }

    pub fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap, DisparityError> {
        compute(left, right, &self.params)
    }
}

/// Disparity of `left` relative to `right` (left pixel `x` matches right `x − d`).
pub fn compute(
    left: &GrayImage,
    right: &GrayImage,
    params: &SgbmParams,
) -> Result<DisparityMap, DisparityError> {
    if left.dimensions() != right.dimensions() {
        return Err(DisparityError::SizeMismatch {
            left: left.dimensions(),
            right: right.dimensions(),
        });
    }
    let (w, h) = (left.width() as usize, left.height() as usize);
    if w == 0 || h == 0 {
        return Err(DisparityError::EmptyImage);
    }
    params.validate()?;

    let mut map = DisparityMap::new_invalid(w as u32, h as u32);
    let x_lo = (params.max_disparity() - 1).max(0) as i64;
    let x_hi = (w as i64 - 1 + params.min_disparity as i64).min(w as i64 - 1);
    if x_lo > x_hi {
        warn!(
            "disparity range [{}, {}) leaves no valid column in a {}-wide image",
            params.min_disparity,
            params.max_disparity(),
            w
        );
        return Ok(map);
    }

    let nd = params.num_disparities as usize;
    let l = cost::prepare(left, params.pre_filter_cap);
    let r = cost::prepare(right, params.pre_filter_cap);
    let builder = CostBuilder {
        left: &l,
        right: &r,
        width: w,
        height: h,
        min_d: params.min_disparity,
        nd,
        half: (params.block_size / 2) as usize,
    };
    let pen = Penalties {
        p1: params.p1,
        p2: params.p2,
    };
    let sel = Selection {
        min_d: params.min_disparity,
        nd,
        uniqueness_ratio: params.uniqueness_ratio,
        disp12_max_diff: params.disp12_max_diff,
        x_lo: x_lo as usize,
        x_hi: x_hi as usize,
    };

    match params.mode {
        SgbmMode::Full => {
            let volume = builder.volume();
            let sum = aggregate_full(&volume, w, h, nd, pen);
            map.data
                .par_chunks_mut(w)
                .zip(sum.par_chunks(w * nd))
                .for_each(|(out, s)| select_row(s, &sel, out));
        }
        SgbmMode::Reduced => {
            let mut rows = builder.rolling();
            let mut agg = ReducedAggregator::new(w, nd, pen);
            let mut cost_row = vec![0u16; w * nd];
            let mut sum = vec![0u32; w * nd];
            for out in map.data.chunks_mut(w) {
                rows.next_row(&mut cost_row);
                agg.push_row(&cost_row, &mut sum);
                select_row(&sum, &sel, out);
            }
        }
    }

    filter_speckles(&mut map, params.speckle_window_size, params.speckle_range);
    debug!(
        "disparity {}x{} ({:?}): {} of {} pixels valid",
        w,
        h,
        params.mode,
        map.valid_count(),
        w * h
    );
    Ok(map)
}
