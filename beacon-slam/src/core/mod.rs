//! Core foundation layer.
//!
//! This is the bottom layer of the localization stack with no internal
//! dependencies. All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Estimate and measurement value types
//! - [`math`]: Angle arithmetic, Gaussian helpers, sphere sampling

pub mod math;
pub mod types;
