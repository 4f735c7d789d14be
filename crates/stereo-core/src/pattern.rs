//! Checkerboard geometry and per-image observations.
//!
//! A board is described by its count of *interior* corners. Corner `(i, j)`
//! (column `i`, row `j`) lies at `(i·s, j·s, 0)` on the board plane and the
//! canonical ordering is row-major: `board_width` corners per row, rows in
//! increasing `j`.

use crate::{Pt2, Pt3, Real};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

fn unit_square() -> Real {
    1.0
}

/// Known layout of the calibration checkerboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    /// Interior corners per row.
    pub board_width: usize,
    /// Interior corners per column.
    pub board_height: usize,
    /// Distance between neighbouring corners (board units).
    #[serde(default = "unit_square")]
    pub square_size: Real,
}

impl PatternGeometry {
    /// Board with unit square spacing.
    pub fn new(board_width: usize, board_height: usize) -> Self {
        Self {
            board_width,
            board_height,
            square_size: unit_square(),
        }
    }

    pub fn with_square_size(mut self, square_size: Real) -> Self {
        self.square_size = square_size;
        self
    }

    pub fn corner_count(&self) -> usize {
        self.board_width * self.board_height
    }

    /// Raster index of corner `(i, j)`.
    #[inline]
    pub fn corner_index(&self, i: usize, j: usize) -> usize {
        j * self.board_width + i
    }

    /// Board-frame coordinates of all interior corners in raster order.
    pub fn object_points(&self) -> Vec<Pt3> {
        let mut pts = Vec::with_capacity(self.corner_count());
        for j in 0..self.board_height {
            for i in 0..self.board_width {
                pts.push(Pt3::new(
                    i as Real * self.square_size,
                    j as Real * self.square_size,
                    0.0,
                ));
            }
        }
        pts
    }
}

/// 2D/3D correspondences extracted from one calibration image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Board-frame points (Z = 0).
    pub points_3d: Vec<Pt3>,
    /// Detected pixel positions, positionally paired with `points_3d`.
    pub points_2d: Vec<Pt2>,
}

impl Observation {
    /// # Errors
    ///
    /// Returns an error if the 3D and 2D point counts don't match.
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    /// Pair a complete set of raster-ordered corners with the board points.
    ///
    /// Partial detections are rejected: an observation is either complete or
    /// not constructed at all.
    pub fn from_corners(pattern: &PatternGeometry, corners: Vec<Pt2>) -> Result<Self> {
        ensure!(
            corners.len() == pattern.corner_count(),
            "incomplete detection: {} of {} corners",
            corners.len(),
            pattern.corner_count()
        );
        Self::new(pattern.object_points(), corners)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }

    /// Board points projected onto the plane (drops Z).
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d.iter().map(|p| Pt2::new(p.x, p.y)).collect()
    }

    pub fn is_complete_for(&self, pattern: &PatternGeometry) -> bool {
        self.len() == pattern.corner_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major() {
        let pattern = PatternGeometry::new(3, 2).with_square_size(0.5);
        let pts = pattern.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 0.5, 0.0));
        assert_eq!(pattern.corner_index(2, 1), 5);
    }

    #[test]
    fn partial_detection_is_rejected() {
        let pattern = PatternGeometry::new(3, 2);
        let corners = vec![Pt2::new(0.0, 0.0); 5];
        assert!(Observation::from_corners(&pattern, corners).is_err());
    }

    #[test]
    fn pattern_deserializes_without_square_size() {
        let p: PatternGeometry =
            serde_json::from_str(r#"{"board_height": 9, "board_width": 6}"#).unwrap();
        assert_eq!(p, PatternGeometry::new(6, 9));
    }
}
