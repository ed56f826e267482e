//! I/O infrastructure layer.
//!
//! - [`csv_log`]: Measurement log reader and estimate writer
//! - [`replay`]: Offline replay of a log through the engine

pub mod csv_log;
pub mod replay;

pub use csv_log::{
    BeaconRecord, EstimateWriter, Measurement, MeasurementLog, MotionRecord, RangeRecord,
    RssiRecord, TagRecord,
};
pub use replay::{ReplayConfig, ReplaySummary, replay};
