//! Core data types for localization.
//!
//! Outputs:
//! - [`TagEstimate`]: Weighted-mean pose of the tracked tag
//! - [`BeaconEstimate`]: Weighted-mean position of one beacon
//!
//! Inputs:
//! - [`OdometrySample`]: One VIO position sample
//! - [`RangeMeasurement`]: UWB distance to a named beacon
//! - [`RssiMeasurement`]: Signal strength from a named beacon

mod estimate;
mod measurement;

pub use estimate::{BeaconEstimate, TagEstimate};
pub use measurement::{
    OdometrySample, RSSI_MAX_DBM, RSSI_MIN_DBM, RangeMeasurement, RssiMeasurement,
};
