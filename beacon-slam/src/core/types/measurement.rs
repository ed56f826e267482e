//! Measurement inputs accepted by the engine.
//!
//! Each type validates itself before it can touch particle state, so a
//! rejected measurement never partially applies.

use serde::{Deserialize, Serialize};

use crate::error::{LocalizeError, Result};

/// Weakest RSSI accepted (dBm).
pub const RSSI_MIN_DBM: i32 = -127;

/// Strongest RSSI accepted (dBm). Received power above 0 dBm is not
/// physically plausible for the radios involved.
pub const RSSI_MAX_DBM: i32 = 0;

/// One odometry position sample from the visual tracking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    /// Monotonic timestamp in seconds
    pub t: f64,
    /// X position in the odometry frame (meters)
    pub x: f64,
    /// Y position in the odometry frame (meters)
    pub y: f64,
    /// Z position in the odometry frame (meters)
    pub z: f64,
}

impl OdometrySample {
    /// Create a new sample.
    #[inline]
    pub fn new(t: f64, x: f64, y: f64, z: f64) -> Self {
        Self { t, x, y, z }
    }

    /// Reject non-finite timestamps or coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.t.is_finite() {
            return Err(LocalizeError::invalid(format!(
                "odometry timestamp is not finite: {}",
                self.t
            )));
        }
        if !(self.x.is_finite() && self.y.is_finite() && self.z.is_finite()) {
            return Err(LocalizeError::invalid(format!(
                "odometry position is not finite: ({}, {}, {})",
                self.x, self.y, self.z
            )));
        }
        Ok(())
    }
}

/// UWB range from the tag to one beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeMeasurement {
    /// Beacon identifier
    pub beacon: String,
    /// Measured distance (meters)
    pub range: f64,
    /// Standard deviation of the distance (meters)
    pub std_range: f64,
}

impl RangeMeasurement {
    /// Create a new range measurement.
    pub fn new(beacon: impl Into<String>, range: f64, std_range: f64) -> Self {
        Self {
            beacon: beacon.into(),
            range,
            std_range,
        }
    }

    /// Reject empty names, negative or non-finite ranges, and non-positive
    /// or non-finite standard deviations.
    pub fn validate(&self) -> Result<()> {
        validate_beacon_name(&self.beacon)?;
        if !self.range.is_finite() || self.range < 0.0 {
            return Err(LocalizeError::invalid(format!(
                "range to {} must be finite and non-negative, got {}",
                self.beacon, self.range
            )));
        }
        if !self.std_range.is_finite() || self.std_range <= 0.0 {
            return Err(LocalizeError::invalid(format!(
                "range std to {} must be finite and positive, got {}",
                self.beacon, self.std_range
            )));
        }
        Ok(())
    }
}

/// Received signal strength from one beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssiMeasurement {
    /// Beacon identifier
    pub beacon: String,
    /// Signal strength (dBm)
    pub rssi: i32,
}

impl RssiMeasurement {
    /// Create a new RSSI measurement.
    pub fn new(beacon: impl Into<String>, rssi: i32) -> Self {
        Self {
            beacon: beacon.into(),
            rssi,
        }
    }

    /// Reject empty names and values outside [`RSSI_MIN_DBM`, `RSSI_MAX_DBM`].
    pub fn validate(&self) -> Result<()> {
        validate_beacon_name(&self.beacon)?;
        if !(RSSI_MIN_DBM..=RSSI_MAX_DBM).contains(&self.rssi) {
            return Err(LocalizeError::invalid(format!(
                "rssi from {} outside [{}, {}] dBm: {}",
                self.beacon, RSSI_MIN_DBM, RSSI_MAX_DBM, self.rssi
            )));
        }
        Ok(())
    }
}

fn validate_beacon_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LocalizeError::invalid("beacon identifier is empty"));
    }
    Ok(())
}
