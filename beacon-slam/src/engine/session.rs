//! One localization session: engine plus frame reconciler.
//!
//! This is the pose-manager loop that sits between the producers (tracking
//! frames, radio events) and the renderer. Tracking frames are gated on the
//! tracking-quality flag, converted into filter axes and deposited as
//! motion; every accepted update recomputes the world → tracking transform.

use nalgebra::Isometry3;

use crate::algorithms::frames::{FrameReconciler, ReconcilerConfig};
use crate::core::types::{BeaconEstimate, TagEstimate};
use crate::error::Result;

use super::localization_engine::{EngineConfig, LocalizationEngine};

/// One device pose from the visual tracking subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingFrame {
    /// Monotonic timestamp (seconds)
    pub t: f64,
    /// Device pose in the tracking frame
    pub pose: Isometry3<f64>,
    /// False while the tracker is lost or initializing
    pub is_tracking: bool,
}

impl TrackingFrame {
    /// A frame with a valid tracking flag.
    pub fn tracking(t: f64, pose: Isometry3<f64>) -> Self {
        Self {
            t,
            pose,
            is_tracking: true,
        }
    }
}

/// Engine and reconciler driven together.
#[derive(Debug)]
pub struct LocalizationSession {
    engine: LocalizationEngine,
    reconciler: FrameReconciler,
    last_pose: Option<Isometry3<f64>>,
    skipped_frames: u64,
}

impl LocalizationSession {
    /// Start a session.
    pub fn new(engine: EngineConfig, reconciler: ReconcilerConfig) -> Result<Self> {
        Ok(Self {
            engine: LocalizationEngine::new(engine)?,
            reconciler: FrameReconciler::new(reconciler)?,
            last_pose: None,
            skipped_frames: 0,
        })
    }

    /// The underlying engine.
    pub fn engine(&self) -> &LocalizationEngine {
        &self.engine
    }

    /// Mutable engine, for anchoring beacons or direct deposits.
    pub fn engine_mut(&mut self) -> &mut LocalizationEngine {
        &mut self.engine
    }

    /// The frame reconciler.
    pub fn reconciler(&self) -> &FrameReconciler {
        &self.reconciler
    }

    /// Frames dropped because tracking was not available.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// Handle one tracking frame.
    ///
    /// Returns `Ok(false)` if the frame was skipped by the tracking gate.
    pub fn on_tracking_frame(&mut self, frame: &TrackingFrame) -> Result<bool> {
        if !frame.is_tracking {
            self.skipped_frames += 1;
            log::debug!("Skipping frame t={:.3}: not tracking", frame.t);
            return Ok(false);
        }

        let odom = self.reconciler.to_filter_axes(&frame.pose);
        let p = odom.translation.vector;
        self.engine.deposit_motion(frame.t, p.x, p.y, p.z)?;

        self.last_pose = Some(frame.pose);
        self.refresh_transform();
        Ok(true)
    }

    /// Handle one range event.
    pub fn on_range(&mut self, beacon: &str, range: f64, std_range: f64) -> Result<()> {
        let result = self.engine.deposit_range(beacon, range, std_range);
        self.refresh_transform();
        result
    }

    /// Handle one RSSI event.
    pub fn on_rssi(&mut self, beacon: &str, rssi: i32) -> Result<()> {
        let result = self.engine.deposit_rssi(beacon, rssi);
        self.refresh_transform();
        result
    }

    /// Current tag estimate.
    pub fn tag_estimate(&self) -> TagEstimate {
        self.engine.tag_estimate()
    }

    /// Current estimate of one beacon.
    pub fn beacon_estimate(&self, beacon: &str) -> Result<BeaconEstimate> {
        self.engine.beacon_estimate(beacon)
    }

    /// Map a filter-world pose into the tracking frame.
    pub fn pose_to_draw(&self, world_pose: &Isometry3<f64>) -> Result<Isometry3<f64>> {
        self.reconciler.project(world_pose)
    }

    /// Where to render a beacon in the tracking frame.
    pub fn beacon_pose_to_draw(&self, beacon: &str) -> Result<Isometry3<f64>> {
        let estimate = self.engine.beacon_estimate(beacon)?;
        self.reconciler.project(&estimate.to_isometry())
    }

    fn refresh_transform(&mut self) {
        if let Some(pose) = self.last_pose {
            self.reconciler.update(&pose, &self.engine.tag_estimate());
        }
    }
}
