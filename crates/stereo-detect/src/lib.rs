//! Checkerboard corner detection.
//!
//! Detection runs in three stages:
//! 1. ChESS X-corner response, relative threshold and non-maximum suppression;
//! 2. grid assembly into exactly `board_width × board_height` nodes;
//! 3. subpixel refinement by gradient orthogonality.
//!
//! Corners come back in raster order (`board_width` per row, rows top to
//! bottom) with a fixed orientation convention, so two cameras looking at the
//! same board produce positionally matching lists.

mod candidates;
mod error;
mod gray;
mod grid;
mod params;
mod response;
mod subpix;

pub use error::DetectError;
pub use params::DetectorParams;

use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use stereo_core::{Observation, PatternGeometry, Pt2};

/// Stateless checkerboard detector.
#[derive(Clone, Debug, Default)]
pub struct PatternDetector {
    pub params: DetectorParams,
}

impl PatternDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    /// Sub-pixel corners of a `board_width × board_height` board, raster order.
    pub fn detect(
        &self,
        image: &GrayImage,
        board_width: usize,
        board_height: usize,
    ) -> Result<Vec<Pt2>, DetectError> {
        detect_corners(image, board_width, board_height, &self.params)
    }

    /// Detect and pair the corners with the board geometry.
    pub fn detect_observation(
        &self,
        image: &GrayImage,
        pattern: &PatternGeometry,
    ) -> Result<Observation, DetectError> {
        let corners = self.detect(image, pattern.board_width, pattern.board_height)?;
        Ok(Observation {
            points_3d: pattern.object_points(),
            points_2d: corners,
        })
    }

    /// Detect on many images in parallel; results keep the input order.
    pub fn detect_all(
        &self,
        images: &[GrayImage],
        pattern: &PatternGeometry,
    ) -> Vec<Result<Observation, DetectError>> {
        images
            .par_iter()
            .map(|img| self.detect_observation(img, pattern))
            .collect()
    }
}

/// Free-function form of [`PatternDetector::detect`].
pub fn detect_corners(
    image: &GrayImage,
    board_width: usize,
    board_height: usize,
    params: &DetectorParams,
) -> Result<Vec<Pt2>, DetectError> {
    if board_width < 2 || board_height < 2 {
        return Err(DetectError::InvalidBoard {
            width: board_width,
            height: board_height,
        });
    }
    let not_found = |reason: String| DetectError::PatternNotFound {
        width: board_width,
        height: board_height,
        reason,
    };

    let gray = gray::GrayF32::from_image(image);
    let min_side = 2 * response::RING_RADIUS + 3;
    if gray.w < min_side || gray.h < min_side {
        return Err(not_found(format!(
            "image {}x{} too small",
            gray.w, gray.h
        )));
    }
    let contrast = gray.intensity_range();
    if contrast < params.min_contrast {
        return Err(not_found(format!("low contrast ({contrast:.1})")));
    }

    let resp = response::chess_response(&gray);
    let mut cands = candidates::find_candidates(&resp, params.threshold_rel, params.nms_radius);
    debug!(
        "{} corner candidates (max response {:.1})",
        cands.len(),
        resp.max()
    );
    // Clutter only slows grid assembly down; the board corners are among the strongest.
    let keep = (4 * board_width * board_height).max(64);
    if cands.len() > keep {
        cands.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        cands.truncate(keep);
    }
    let points: Vec<Pt2> = cands.iter().map(|c| c.pos).collect();

    let coarse = grid::assemble_grid(&points, board_width, board_height, params.grid_tolerance)
        .map_err(not_found)?;

    let refined = coarse
        .into_iter()
        .map(|p| {
            subpix::refine_corner(
                &gray,
                p,
                params.refine_half_window,
                params.refine_epsilon,
                params.refine_max_iters,
            )
        })
        .collect();
    Ok(refined)
}
