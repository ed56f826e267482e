//! Core algorithms layer.
//!
//! - [`localization`]: Particle sets, motion model, observation models
//! - [`frames`]: Reconciliation between the filter frame and the tracking frame

pub mod frames;
pub mod localization;
