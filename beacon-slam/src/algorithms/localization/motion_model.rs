//! Odometry-driven motion model for the tag particle set.
//!
//! VIO supplies positions only. Consecutive samples are differenced into a
//! displacement which each particle applies in its own heading frame (the
//! particle's yaw is the offset between the odometry frame and the world
//! frame), plus independent Gaussian noise whose scale grows with the
//! distance travelled. Heading itself is never changed by odometry.

use serde::{Deserialize, Serialize};

use crate::algorithms::localization::TagState;
use crate::core::math::sample_gaussian;
use crate::core::types::OdometrySample;
use crate::error::{LocalizeError, Result};
use rand::Rng;

/// Configuration for the odometry motion model.
///
/// Per-axis position noise standard deviation is
/// `noise_floor + noise_per_meter * |displacement|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionModelConfig {
    /// Noise growth with distance travelled (m/m).
    /// Typical: 0.01-0.1 for phone-grade VIO.
    pub noise_per_meter: f64,

    /// Fixed noise applied even for near-zero motion (m).
    pub noise_floor: f64,
}

impl Default for MotionModelConfig {
    fn default() -> Self {
        Self {
            noise_per_meter: 0.05,
            noise_floor: 0.002,
        }
    }
}

impl MotionModelConfig {
    /// Low-noise configuration (well-lit scenes, good tracking).
    pub fn low_noise() -> Self {
        Self {
            noise_per_meter: 0.01,
            noise_floor: 0.0005,
        }
    }

    /// High-noise configuration (textureless scenes, frequent relocalization).
    pub fn high_noise() -> Self {
        Self {
            noise_per_meter: 0.15,
            noise_floor: 0.01,
        }
    }
}

/// Relative motion between two odometry samples, in the odometry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionDelta {
    /// Elapsed time (seconds)
    pub dt: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl MotionDelta {
    /// Length of the displacement.
    #[inline]
    pub fn distance(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy + self.dz * self.dz).sqrt()
    }
}

/// Odometry motion model.
///
/// Remembers the previous sample; the first sample only establishes the
/// reference origin.
#[derive(Debug, Clone)]
pub struct MotionModel {
    config: MotionModelConfig,
    last: Option<OdometrySample>,
}

impl MotionModel {
    /// Create a new motion model with the given configuration.
    pub fn new(config: MotionModelConfig) -> Self {
        Self { config, last: None }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MotionModelConfig {
        &self.config
    }

    /// The most recent accepted sample, if any.
    pub fn last_sample(&self) -> Option<&OdometrySample> {
        self.last.as_ref()
    }

    /// Check a sample without consuming it.
    ///
    /// Timestamps must be finite and strictly increasing.
    pub fn check(&self, sample: &OdometrySample) -> Result<()> {
        sample.validate()?;
        if let Some(last) = &self.last
            && sample.t <= last.t
        {
            return Err(LocalizeError::invalid(format!(
                "odometry timestamp not increasing: {} after {}",
                sample.t, last.t
            )));
        }
        Ok(())
    }

    /// Accept a sample and return the displacement since the previous one.
    ///
    /// Returns `Ok(None)` for the very first sample. A rejected sample
    /// leaves the model untouched.
    pub fn observe(&mut self, sample: &OdometrySample) -> Result<Option<MotionDelta>> {
        self.check(sample)?;
        let delta = self.last.map(|last| MotionDelta {
            dt: sample.t - last.t,
            dx: sample.x - last.x,
            dy: sample.y - last.y,
            dz: sample.z - last.z,
        });
        self.last = Some(*sample);
        Ok(delta)
    }

    /// Per-axis noise standard deviation for a displacement.
    #[inline]
    pub fn noise_sigma(&self, delta: &MotionDelta) -> f64 {
        self.config.noise_floor + self.config.noise_per_meter * delta.distance()
    }

    /// Sample a new tag state given the odometry displacement.
    ///
    /// The displacement is rotated by the particle's yaw about +Z before
    /// being applied; heading is left unchanged.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        state: &TagState,
        delta: &MotionDelta,
        rng: &mut R,
    ) -> TagState {
        let sigma = self.noise_sigma(delta);
        let (s, c) = state.theta.sin_cos();
        let world_dx = delta.dx * c - delta.dy * s;
        let world_dy = delta.dx * s + delta.dy * c;

        TagState {
            x: state.x + world_dx + sample_gaussian(rng, sigma),
            y: state.y + world_dy + sample_gaussian(rng, sigma),
            z: state.z + delta.dz + sample_gaussian(rng, sigma),
            theta: state.theta,
        }
    }
}
