//! Coordinate-frame bookkeeping between the filter and visual tracking.
//!
//! - [`FrameReconciler`]: Recomputes the world → tracking transform from the
//!   live device pose and the tag estimate
//! - [`AxisConvention`]: Fixed axis swap between tracking and filter frames

mod reconciler;

pub use reconciler::{AxisConvention, FrameReconciler, ReconcilerConfig, ReconcilerState};
