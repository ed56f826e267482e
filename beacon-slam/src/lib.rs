//! beacon-slam - Joint tag and beacon localization with a particle filter
//!
//! Fuses visual-inertial odometry, UWB ranges and RSSI readings to track a
//! moving tag while estimating the positions of radio beacons that are not
//! known in advance.
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      bin/                           │  ← Executables
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │                (csv logs, replay)                   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │      (engine, beacon registry, session, shared)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │            (localization, frames)                   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Filter cycle
//!
//! - Odometry: displacement between consecutive VIO samples, rotated by
//!   each tag particle's heading, plus distance-scaled Gaussian noise
//! - Range / RSSI: tag particle `i` is paired with beacon particle `i`;
//!   the pair's likelihood reweights both sets
//! - Resampling: systematic, triggered at `ESS <= N/2`; beacon sets follow
//!   the tag's lineage with uniform weights so pairs stay joint hypotheses
//! - Respawn: a poorly fitting short range redraws a few particles from
//!   the range shell
//! - Frames: the world → tracking transform is rebuilt from the live
//!   device pose and the tag estimate after every update
//!
//! # Example
//!
//! ```no_run
//! use beacon_slam::{EngineConfig, LocalizationEngine};
//!
//! let mut engine = LocalizationEngine::new(EngineConfig::default())?;
//! engine.deposit_motion(0.0, 0.0, 0.0, 0.0)?;
//! engine.deposit_motion(1.0, 1.0, 0.0, 0.0)?;
//! engine.deposit_range("B1", 4.2, 0.1)?;
//!
//! let tag = engine.tag_estimate();
//! let beacon = engine.beacon_estimate("B1")?;
//! println!("tag ({:.2}, {:.2}) beacon ({:.2}, {:.2})", tag.x, tag.y, beacon.x, beacon.y);
//! # Ok::<(), beacon_slam::LocalizeError>(())
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 3: Engine (depends on core, algorithms)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 4: I/O infrastructure (depends on all layers)
// ============================================================================
pub mod io;

pub mod config;
pub mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::math;
pub use crate::core::types::{
    BeaconEstimate, OdometrySample, RangeMeasurement, RssiMeasurement, TagEstimate,
};

// Algorithms - Localization
pub use algorithms::localization::{
    BeaconState, MotionModel, MotionModelConfig, ObservationModel, Particle, ParticleSet,
    ParticleSetSnapshot, ParticleState, RangeLikelihood, RangeModelConfig, RssiLikelihood,
    RssiModelConfig, TagState,
};

// Algorithms - Frames
pub use algorithms::frames::{AxisConvention, FrameReconciler, ReconcilerConfig, ReconcilerState};

// Engine
pub use engine::{
    BeaconPrior, BeaconPriorConfig, BeaconRegistry, EngineConfig, EngineStats,
    LocalizationEngine, LocalizationSession, SharedLocalizer, TrackingFrame,
};

// I/O
pub use io::{EstimateWriter, MeasurementLog, ReplayConfig, ReplaySummary};

pub use config::LocalizerConfig;
pub use error::{LocalizeError, Result};
