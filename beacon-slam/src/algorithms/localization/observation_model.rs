//! Measurement likelihoods for range and RSSI observations.
//!
//! Both models map the predicted tag-to-beacon distance of a hypothesis to
//! a likelihood. Hypotheses are formed by pairing tag particle `i` with
//! beacon particle `i`, so the beacon's uncertainty and its correlation with
//! the tag are carried through the update.

use serde::{Deserialize, Serialize};

use super::particle_set::ParticleSet;
use super::particle_state::{BeaconState, TagState};
use crate::core::math::gaussian_kernel;

/// Trait for observation models used in the measurement update.
pub trait ObservationModel {
    /// Likelihood of the measurement given a predicted distance (meters).
    ///
    /// Always finite and non-negative.
    fn likelihood(&self, predicted_distance: f64) -> f64;

    /// Likelihood for every `(tag[i], beacon[i])` pair.
    fn paired_likelihoods(
        &self,
        tags: &ParticleSet<TagState>,
        beacons: &ParticleSet<BeaconState>,
    ) -> Vec<f64> {
        tags.particles()
            .iter()
            .zip(beacons.particles())
            .map(|(t, b)| self.likelihood(b.state.distance_to(&t.state)))
            .collect()
    }
}

/// Configuration for the UWB range model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeModelConfig {
    /// Weight of the uniform outlier component.
    /// Typical: 0.01. Zero gives a pure Gaussian.
    pub outlier_weight: f64,
}

impl Default for RangeModelConfig {
    fn default() -> Self {
        Self {
            outlier_weight: 0.01,
        }
    }
}

/// Gaussian range likelihood mixed with a small outlier floor.
///
/// `L(d) = (1 - ε) · exp(-½ ((d - r) / σ)²) + ε`
#[derive(Debug, Clone, Copy)]
pub struct RangeLikelihood {
    range: f64,
    std_range: f64,
    outlier_weight: f64,
}

impl RangeLikelihood {
    /// Model for one range reading.
    pub fn new(range: f64, std_range: f64, config: &RangeModelConfig) -> Self {
        Self {
            range,
            std_range,
            outlier_weight: config.outlier_weight.clamp(0.0, 1.0),
        }
    }
}

impl ObservationModel for RangeLikelihood {
    fn likelihood(&self, predicted_distance: f64) -> f64 {
        let hit = gaussian_kernel(predicted_distance - self.range, self.std_range);
        (1.0 - self.outlier_weight) * hit + self.outlier_weight
    }
}

/// Configuration for the RSSI path-loss model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssiModelConfig {
    /// Expected RSSI at the reference distance (dBm).
    /// Typical: -59 for BLE beacons at 1 m.
    pub reference_rssi: f64,

    /// Reference distance for `reference_rssi` (meters).
    pub reference_distance: f64,

    /// Path-loss exponent. 2.0 in free space, 2.5-4 indoors.
    pub path_loss_exponent: f64,

    /// Standard deviation of the RSSI residual (dB).
    pub sigma_db: f64,

    /// Distances are clamped to at least this before the log (meters).
    pub min_distance: f64,

    /// Weight of the uniform outlier component.
    pub outlier_weight: f64,
}

impl Default for RssiModelConfig {
    fn default() -> Self {
        Self {
            reference_rssi: -59.0,
            reference_distance: 1.0,
            path_loss_exponent: 2.0,
            sigma_db: 6.0,
            min_distance: 0.1,
            outlier_weight: 0.05,
        }
    }
}

impl RssiModelConfig {
    /// Expected RSSI at a distance under the log-distance path-loss model.
    pub fn expected_rssi(&self, distance: f64) -> f64 {
        let d = distance.max(self.min_distance);
        self.reference_rssi - 10.0 * self.path_loss_exponent * (d / self.reference_distance).log10()
    }

    /// Distance at which the model expects `rssi` (inverse path loss).
    pub fn distance_for(&self, rssi: f64) -> f64 {
        let exponent = (self.reference_rssi - rssi) / (10.0 * self.path_loss_exponent);
        (self.reference_distance * 10f64.powf(exponent)).max(self.min_distance)
    }
}

/// Likelihood of one RSSI reading.
///
/// Monotonically decreasing in predicted distance for readings weaker than
/// the reference; a Gaussian residual in dB around the path-loss curve.
#[derive(Debug, Clone, Copy)]
pub struct RssiLikelihood {
    rssi: f64,
    config: RssiModelConfig,
}

impl RssiLikelihood {
    /// Model for one RSSI reading.
    pub fn new(rssi: i32, config: &RssiModelConfig) -> Self {
        Self {
            rssi: rssi as f64,
            config: *config,
        }
    }
}

impl ObservationModel for RssiLikelihood {
    fn likelihood(&self, predicted_distance: f64) -> f64 {
        let expected = self.config.expected_rssi(predicted_distance);
        let hit = gaussian_kernel(self.rssi - expected, self.config.sigma_db);
        let eps = self.config.outlier_weight.clamp(0.0, 1.0);
        (1.0 - eps) * hit + eps
    }
}
