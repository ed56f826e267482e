//! Thread-safe handle to a localization session.
//!
//! Producers (the tracking-frame callback and the radio-event callback)
//! serialize through the write lock; a deposit completes, resampling
//! included, before any reader can observe the estimates.

use std::sync::Arc;

use nalgebra::Isometry3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::types::{BeaconEstimate, TagEstimate};
use crate::error::Result;

use super::localization_engine::EngineStats;
use super::session::{LocalizationSession, TrackingFrame};

/// Cloneable handle to one session shared between threads.
#[derive(Debug, Clone)]
pub struct SharedLocalizer {
    inner: Arc<RwLock<LocalizationSession>>,
}

impl SharedLocalizer {
    /// Wrap a session.
    pub fn new(session: LocalizationSession) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    /// Deposit a tracking frame.
    pub fn on_tracking_frame(&self, frame: &TrackingFrame) -> Result<bool> {
        self.inner.write().on_tracking_frame(frame)
    }

    /// Deposit a range event.
    pub fn on_range(&self, beacon: &str, range: f64, std_range: f64) -> Result<()> {
        self.inner.write().on_range(beacon, range, std_range)
    }

    /// Deposit an RSSI event.
    pub fn on_rssi(&self, beacon: &str, rssi: i32) -> Result<()> {
        self.inner.write().on_rssi(beacon, rssi)
    }

    /// Current tag estimate.
    pub fn tag_estimate(&self) -> TagEstimate {
        self.inner.read().tag_estimate()
    }

    /// Current estimate of one beacon.
    pub fn beacon_estimate(&self, beacon: &str) -> Result<BeaconEstimate> {
        self.inner.read().beacon_estimate(beacon)
    }

    /// Known beacon identifiers.
    pub fn beacon_names(&self) -> Vec<String> {
        self.inner.read().engine().beacon_names()
    }

    /// Where to render a beacon in the tracking frame.
    pub fn beacon_pose_to_draw(&self, beacon: &str) -> Result<Isometry3<f64>> {
        self.inner.read().beacon_pose_to_draw(beacon)
    }

    /// Engine counters.
    pub fn stats(&self) -> EngineStats {
        *self.inner.read().engine().stats()
    }

    /// Read access for several consistent queries at once.
    pub fn read(&self) -> RwLockReadGuard<'_, LocalizationSession> {
        self.inner.read()
    }

    /// Exclusive access (anchoring beacons, reconfiguration).
    pub fn write(&self) -> RwLockWriteGuard<'_, LocalizationSession> {
        self.inner.write()
    }
}
