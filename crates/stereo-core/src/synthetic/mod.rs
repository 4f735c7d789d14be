//! Deterministic synthetic data generation helpers.
//!
//! Building blocks for synthetic calibration problems used in tests and
//! examples:
//! - pose generators with enough viewpoint diversity for calibration,
//! - projection of the board into one camera or a stereo rig,
//! - rendering of anti-aliased checkerboards and textured planes,
//! - seeded pixel noise.
//!
//! Everything is deterministic (explicit seeds, stable point ordering).
//!
//! # Example
//!
//! ```no_run
//! use stereo_core::{synthetic::planar, BrownConrady5, FxFyCxCySkew, PatternGeometry, PinholeCamera};
//!
//! let cam = PinholeCamera::new(FxFyCxCySkew::new(800.0, 800.0, 320.0, 240.0), BrownConrady5::zero());
//! let pattern = PatternGeometry::new(6, 9);
//! let poses = planar::varied_board_poses(&pattern, 8, 20.0);
//! let views = planar::project_views_all(&cam, &pattern.object_points(), &poses).unwrap();
//! assert_eq!(views.len(), 8);
//! ```

pub mod noise;
pub mod planar;
pub mod render;
