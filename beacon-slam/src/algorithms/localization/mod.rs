//! Sequential Monte Carlo building blocks.
//!
//! # Components
//!
//! - [`ParticleSet`]: Fixed-size weighted population with systematic resampling
//! - [`TagState`] / [`BeaconState`]: The two state spaces particles live on
//! - [`MotionModel`]: VIO displacement with distance-scaled noise
//! - [`RangeLikelihood`] / [`RssiLikelihood`]: Paired measurement likelihoods
//!
//! # Example
//!
//! ```ignore
//! use beacon_slam::algorithms::localization::*;
//!
//! let mut tags = ParticleSet::filled(200, TagState::default())?;
//! let mut motion = MotionModel::new(MotionModelConfig::default());
//!
//! if let Some(delta) = motion.observe(&sample)? {
//!     tags.propagate(|s| *s = motion.sample(s, &delta, &mut rng));
//! }
//!
//! let model = RangeLikelihood::new(5.0, 0.1, &RangeModelConfig::default());
//! let l = model.paired_likelihoods(&tags, &beacon_set);
//! tags.apply_likelihoods(&l);
//! tags.normalize()?;
//! tags.resample_if_needed(0.5, &mut rng);
//! ```

mod motion_model;
mod observation_model;
mod particle_set;
mod particle_state;

pub use motion_model::{MotionDelta, MotionModel, MotionModelConfig};
pub use observation_model::{
    ObservationModel, RangeLikelihood, RangeModelConfig, RssiLikelihood, RssiModelConfig,
};
pub use particle_set::{Particle, ParticleSet, ParticleSetSnapshot};
pub use particle_state::{BeaconState, ParticleState, TagState};
