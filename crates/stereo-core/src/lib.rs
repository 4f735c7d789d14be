//! Core math and geometry primitives for the stereo calibration workspace.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Mat3`, ...),
//! - the pinhole + Brown–Conrady camera model used by every stage,
//! - checkerboard geometry and per-image observations,
//! - deterministic synthetic data (poses, projections, rendered images).
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(point_c)`

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Checkerboard geometry and observations.
pub mod pattern;
/// Synthetic data generation for tests and examples.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use pattern::*;
