//! Localization orchestration layer.
//!
//! This layer coordinates the particle sets, models and frame reconciler
//! into the full filter cycle.
//!
//! # Contents
//!
//! - [`LocalizationEngine`]: Deposit/query contract over the joint filter
//! - [`BeaconRegistry`]: Lazily created per-beacon particle sets
//! - [`LocalizationSession`]: Engine + reconciler driven by tracking frames
//! - [`SharedLocalizer`]: `Arc<RwLock<_>>` handle for multi-threaded producers

mod beacon_registry;
mod localization_engine;
mod session;
mod shared;

pub use beacon_registry::{BeaconEntry, BeaconPrior, BeaconPriorConfig, BeaconRegistry};
pub use localization_engine::{EngineConfig, EngineStats, LocalizationEngine};
pub use session::{LocalizationSession, TrackingFrame};
pub use shared::SharedLocalizer;
