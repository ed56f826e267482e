//! Joint tag/beacon particle filter.
//!
//! Owns the tag particle set and the beacon registry and runs the filter
//! cycle for each deposited measurement:
//!
//! ```text
//! motion:  validate → propagate tag → estimate
//! range:   validate → spawn beacon on first sighting, or
//!          paired likelihoods → reweight tag + beacon → normalize
//!          → resample tag (beacons follow its lineage, weights reset)
//!            or else resample beacon → shell respawn → estimates
//! ```
//!
//! A measurement that fails validation is dropped before anything is
//! touched, so the caller never observes a partial update.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::algorithms::localization::{
    BeaconState, MotionModel, MotionModelConfig, ObservationModel, ParticleSet, ParticleState,
    RangeLikelihood, RangeModelConfig, RssiLikelihood, RssiModelConfig, TagState,
};
use crate::core::types::{
    BeaconEstimate, OdometrySample, RangeMeasurement, RssiMeasurement, TagEstimate,
};
use crate::error::{LocalizeError, Result};

use super::beacon_registry::{BeaconEntry, BeaconPrior, BeaconPriorConfig, BeaconRegistry};

/// Configuration for the localization engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Particles per set (tag and every beacon).
    pub num_particles: usize,

    /// Resample when `ESS <= resampling_threshold * N`.
    pub resampling_threshold: f64,

    /// Position jitter applied after resampling (meters).
    pub roughen_xyz: f64,

    /// Heading jitter applied to tag particles after resampling (radians).
    /// With `adaptive_heading` this is the lower bound.
    pub roughen_heading: f64,

    /// Widen heading jitter to the kernel bandwidth of the heading spread.
    pub adaptive_heading: bool,

    /// Fraction of a set replaced from the range shell when the mean
    /// likelihood of a range update drops below `respawn_weight_threshold`.
    /// Typical: 0.05. Zero disables respawning.
    pub respawn_fraction: f64,

    /// Mean likelihood below which a range update triggers a respawn.
    /// Likelihoods peak at 1.0, so typical: 0.4.
    pub respawn_weight_threshold: f64,

    /// Random seed for deterministic behavior (0 for random).
    pub seed: u64,

    /// Odometry motion model.
    pub motion: MotionModelConfig,

    /// Range likelihood.
    pub range: RangeModelConfig,

    /// RSSI likelihood.
    pub rssi: RssiModelConfig,

    /// Priors for newly heard beacons.
    pub beacon_prior: BeaconPriorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_particles: 200,
            resampling_threshold: 0.5,
            roughen_xyz: 0.02,
            roughen_heading: 0.01,
            adaptive_heading: true,
            respawn_fraction: 0.05,
            respawn_weight_threshold: 0.4,
            seed: 0,
            motion: MotionModelConfig::default(),
            range: RangeModelConfig::default(),
            rssi: RssiModelConfig::default(),
            beacon_prior: BeaconPriorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the filter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(LocalizeError::Config(
                "num_particles must be at least 1".to_string(),
            ));
        }
        check_range("resampling_threshold", self.resampling_threshold, 0.0, 1.0)?;
        check_non_negative("roughen_xyz", self.roughen_xyz)?;
        check_non_negative("roughen_heading", self.roughen_heading)?;
        check_range("respawn_fraction", self.respawn_fraction, 0.0, 1.0)?;
        check_range(
            "respawn_weight_threshold",
            self.respawn_weight_threshold,
            0.0,
            1.0,
        )?;
        check_non_negative("motion.noise_per_meter", self.motion.noise_per_meter)?;
        check_non_negative("motion.noise_floor", self.motion.noise_floor)?;
        check_range("range.outlier_weight", self.range.outlier_weight, 0.0, 1.0)?;
        check_range("rssi.outlier_weight", self.rssi.outlier_weight, 0.0, 1.0)?;
        check_positive("rssi.sigma_db", self.rssi.sigma_db)?;
        check_positive("rssi.path_loss_exponent", self.rssi.path_loss_exponent)?;
        check_positive("rssi.reference_distance", self.rssi.reference_distance)?;
        check_positive("rssi.min_distance", self.rssi.min_distance)?;
        if !self.rssi.reference_rssi.is_finite() {
            return Err(LocalizeError::Config(
                "rssi.reference_rssi must be finite".to_string(),
            ));
        }
        check_positive("beacon_prior.volume_radius", self.beacon_prior.volume_radius)?;
        check_non_negative("beacon_prior.shell_sigmas", self.beacon_prior.shell_sigmas)?;
        check_non_negative(
            "beacon_prior.respawn_max_range",
            self.beacon_prior.respawn_max_range,
        )?;
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(LocalizeError::Config(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(LocalizeError::Config(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if !(value.is_finite() && (lo..=hi).contains(&value)) {
        return Err(LocalizeError::Config(format!(
            "{} must be in [{}, {}], got {}",
            name, lo, hi, value
        )));
    }
    Ok(())
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Accepted odometry samples (including the reference sample).
    pub motion_updates: u64,
    /// Applied range measurements.
    pub range_updates: u64,
    /// Applied RSSI measurements.
    pub rssi_updates: u64,
    /// Resampling passes over any set.
    pub resamples: u64,
    /// Range updates that replaced particles from the range shell.
    pub respawns: u64,
    /// Weight collapses recovered by resetting to uniform.
    pub degeneracies: u64,
    /// Measurements rejected by validation.
    pub dropped: u64,
}

/// Range reading that a respawn can draw a shell from.
#[derive(Debug, Clone, Copy)]
struct RangeShell {
    range: f64,
    std_range: f64,
}

/// Sequential Monte Carlo estimator for one tag and many beacons.
#[derive(Debug, Clone)]
pub struct LocalizationEngine {
    config: EngineConfig,
    motion: MotionModel,
    tag: ParticleSet<TagState>,
    tag_estimate: TagEstimate,
    beacons: BeaconRegistry,
    rng: StdRng,
    stats: EngineStats,
}

impl LocalizationEngine {
    /// Create an engine with every tag particle at the origin.
    ///
    /// The tag estimate is the identity pose until the first update.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        let tag = ParticleSet::filled(config.num_particles, TagState::default())?;

        log::debug!(
            "Localization engine: {} particles, resample at ESS <= {:.2}N",
            config.num_particles,
            config.resampling_threshold
        );

        Ok(Self {
            motion: MotionModel::new(config.motion),
            tag,
            tag_estimate: TagEstimate::identity(),
            beacons: BeaconRegistry::new(config.beacon_prior),
            rng,
            stats: EngineStats::default(),
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Feed one odometry sample.
    ///
    /// The first sample only sets the reference; later samples propagate
    /// the tag set by the displacement since the previous sample.
    pub fn deposit_motion(&mut self, t: f64, x: f64, y: f64, z: f64) -> Result<()> {
        let sample = OdometrySample::new(t, x, y, z);
        let delta = match self.motion.observe(&sample) {
            Ok(delta) => delta,
            Err(e) => return Err(self.drop_measurement(e)),
        };

        if let Some(delta) = delta {
            let motion = &self.motion;
            let rng = &mut self.rng;
            self.tag
                .propagate(|s| *s = motion.sample(s, &delta, rng));
        }

        self.stats.motion_updates += 1;
        self.refresh_tag_estimate(t);
        Ok(())
    }

    /// Apply a range measurement to `beacon`.
    ///
    /// A never-seen beacon is spawned on a shell of radius `range` around
    /// the tag particles and the reading is consumed by that prior; the
    /// weights are not touched. Later readings reweight the tag and beacon
    /// jointly and may respawn part of a set from the range shell.
    pub fn deposit_range(&mut self, beacon: &str, range: f64, std_range: f64) -> Result<()> {
        let measurement = RangeMeasurement::new(beacon, range, std_range);
        if let Err(e) = measurement.validate() {
            return Err(self.drop_measurement(e));
        }

        let prior = BeaconPrior::Shell { range, std_range };
        let result = if self.spawn_if_unknown(beacon, prior)? {
            Ok(())
        } else {
            let model = RangeLikelihood::new(range, std_range, &self.config.range);
            self.apply_observation(beacon, &model, Some(RangeShell { range, std_range }))
        };
        self.stats.range_updates += 1;
        result
    }

    /// Apply an RSSI measurement to `beacon`.
    ///
    /// A never-seen beacon is spawned uniformly in a ball around the tag
    /// estimate and the reading is consumed by that prior.
    pub fn deposit_rssi(&mut self, beacon: &str, rssi: i32) -> Result<()> {
        let measurement = RssiMeasurement::new(beacon, rssi);
        if let Err(e) = measurement.validate() {
            return Err(self.drop_measurement(e));
        }

        let result = if self.spawn_if_unknown(beacon, BeaconPrior::Volume)? {
            Ok(())
        } else {
            let model = RssiLikelihood::new(rssi, &self.config.rssi);
            self.apply_observation(beacon, &model, None)
        };
        self.stats.rssi_updates += 1;
        result
    }

    /// Register a beacon at a surveyed position.
    ///
    /// Observations of an anchored beacon only reweight the tag.
    pub fn anchor_beacon(&mut self, beacon: &str, x: f64, y: f64, z: f64) -> Result<()> {
        let t = self.tag_estimate.t;
        self.beacons
            .anchor(beacon, BeaconState::new(x, y, z), self.tag.len(), t)?;
        Ok(())
    }

    /// Current tag estimate.
    pub fn tag_estimate(&self) -> TagEstimate {
        self.tag_estimate
    }

    /// Current estimate for `beacon`.
    pub fn beacon_estimate(&self, beacon: &str) -> Result<BeaconEstimate> {
        self.beacons
            .get(beacon)
            .map(BeaconEntry::estimate)
            .ok_or_else(|| LocalizeError::UnknownBeacon(beacon.to_string()))
    }

    /// Known beacon identifiers in discovery order.
    pub fn beacon_names(&self) -> Vec<String> {
        self.beacons.names()
    }

    /// Per-axis position variance of a beacon's particle set.
    pub fn beacon_variance(&self, beacon: &str) -> Result<Vector3<f64>> {
        Ok(self.beacon_entry(beacon)?.particles().variance())
    }

    /// Effective sample size of the tag set.
    pub fn tag_ess(&self) -> f64 {
        self.tag.ess()
    }

    /// Effective sample size of a beacon's set.
    pub fn beacon_ess(&self, beacon: &str) -> Result<f64> {
        Ok(self.beacon_entry(beacon)?.particles().ess())
    }

    /// Tag particle set (read-only).
    pub fn tag_particles(&self) -> &ParticleSet<TagState> {
        &self.tag
    }

    /// A beacon's particle set (read-only).
    pub fn beacon_particles(&self, beacon: &str) -> Result<&ParticleSet<BeaconState>> {
        Ok(self.beacon_entry(beacon)?.particles())
    }

    /// Registry entry for a beacon.
    pub fn beacon_entry(&self, beacon: &str) -> Result<&BeaconEntry> {
        self.beacons
            .get(beacon)
            .ok_or_else(|| LocalizeError::UnknownBeacon(beacon.to_string()))
    }

    /// The beacon registry (read-only).
    pub fn beacons(&self) -> &BeaconRegistry {
        &self.beacons
    }

    fn drop_measurement(&mut self, e: LocalizeError) -> LocalizeError {
        log::debug!("Dropped measurement: {}", e);
        self.stats.dropped += 1;
        e
    }

    /// Create `name` from `prior` if it has never been heard.
    ///
    /// Returns true if the beacon was created by this call.
    fn spawn_if_unknown(&mut self, name: &str, prior: BeaconPrior) -> Result<bool> {
        if self.beacons.contains(name) {
            return Ok(false);
        }
        let t = self.tag_estimate.t;
        let entry = self
            .beacons
            .get_or_create(name, prior, &self.tag, t, &mut self.rng)?;
        entry.record_observation();
        Ok(true)
    }

    /// Shared reweight/resample cycle for range and RSSI.
    fn apply_observation<M: ObservationModel>(
        &mut self,
        name: &str,
        model: &M,
        shell: Option<RangeShell>,
    ) -> Result<()> {
        let t = self.tag_estimate.t;
        let ratio = self.config.resampling_threshold;
        let sigma_xyz = self.config.roughen_xyz;

        let entry = self
            .beacons
            .get_mut(name)
            .ok_or_else(|| LocalizeError::UnknownBeacon(name.to_string()))?;
        entry.record_observation();
        let anchored = entry.is_anchored();

        let likelihoods = model.paired_likelihoods(&self.tag, entry.particles());

        // Sets are normalized before every update, so the reweighted total
        // is the mean likelihood of the reading.
        let mut degenerate = None;
        self.tag.apply_likelihoods(&likelihoods);
        let mut fit = self.tag.total_weight();
        if let Err(e) = self.tag.normalize() {
            degenerate = Some(recover("tag", e, &mut self.stats));
            self.tag.reset_weights();
        }
        if !anchored {
            let beacon_set = entry.particles_mut();
            beacon_set.apply_likelihoods(&likelihoods);
            fit = beacon_set.total_weight();
            if let Err(e) = beacon_set.normalize() {
                degenerate = Some(recover(name, e, &mut self.stats));
                beacon_set.reset_weights();
            }
        }

        let respawn = shell.map_or(0, |s| self.respawn_count(fit, s.range));

        // Tag resampling drags every beacon along so pair i stays a joint
        // hypothesis. An anchored respawn replaces tag particles and so
        // forces the pass.
        let force_tag = anchored && respawn > 0;
        let mut tag_resampled = false;
        if force_tag || self.tag.needs_resample(ratio) {
            let sigma_heading = self.heading_jitter();
            let ancestors = self.tag.resample(&mut self.rng);
            self.stats.resamples += 1;
            self.tag.roughen(sigma_xyz, sigma_heading, &mut self.rng);
            for other in self.beacons.iter_mut() {
                other.particles_mut().gather(&ancestors);
            }
            tag_resampled = true;
            log::debug!("Resampled tag set after {} update", name);
        }

        if let Some(shell) = shell
            && respawn > 0
        {
            if anchored {
                self.respawn_tags(name, shell, respawn);
            } else {
                self.respawn_beacon(name, shell, respawn, tag_resampled);
            }
        } else if !anchored {
            self.resample_beacon(name, tag_resampled);
        }

        self.refresh_tag_estimate(t);
        for entry in self.beacons.iter_mut() {
            if entry.name() == name {
                entry.refresh_estimate(t);
            } else {
                entry.refresh_position();
            }
        }

        match degenerate {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Particles to replace from the range shell, or 0 if the reading fits.
    fn respawn_count(&self, fit: f64, range: f64) -> usize {
        let fraction = self.config.respawn_fraction;
        if fraction <= 0.0 || range >= self.beacons.config().respawn_max_range {
            return 0;
        }
        if fit < self.config.respawn_weight_threshold {
            (self.tag.len() as f64 * fraction).round() as usize
        } else {
            0
        }
    }

    /// Heading jitter for the next tag resample.
    fn heading_jitter(&self) -> f64 {
        if self.config.adaptive_heading {
            self.config
                .roughen_heading
                .max(self.tag.heading_bandwidth())
        } else {
            self.config.roughen_heading
        }
    }

    /// Resample the observed beacon on its own weights unless it has just
    /// followed the tag's lineage.
    fn resample_beacon(&mut self, name: &str, tag_resampled: bool) {
        let ratio = self.config.resampling_threshold;
        let sigma_xyz = self.config.roughen_xyz;
        let Some(entry) = self.beacons.get_mut(name) else {
            return;
        };
        let beacon_set = entry.particles_mut();
        if tag_resampled {
            beacon_set.roughen(sigma_xyz, 0.0, &mut self.rng);
        } else if beacon_set.needs_resample(ratio) {
            beacon_set.resample(&mut self.rng);
            beacon_set.roughen(sigma_xyz, 0.0, &mut self.rng);
            self.stats.resamples += 1;
            log::debug!("Resampled beacon {}", name);
        }
    }

    /// Replace leading beacon particles with shell points around their
    /// paired tag particles.
    fn respawn_beacon(&mut self, name: &str, shell: RangeShell, count: usize, tag_resampled: bool) {
        let sigma_xyz = self.config.roughen_xyz;
        let prior = *self.beacons.config();
        let Some(entry) = self.beacons.get_mut(name) else {
            return;
        };
        let beacon_set = entry.particles_mut();
        if !tag_resampled {
            beacon_set.resample(&mut self.rng);
            self.stats.resamples += 1;
        }
        beacon_set.roughen(sigma_xyz, 0.0, &mut self.rng);

        let tags = self.tag.particles();
        let rng = &mut self.rng;
        beacon_set.respawn(count, |i| {
            prior.shell_point(&tags[i].state.position(), shell.range, shell.std_range, rng)
        });
        self.stats.respawns += 1;
        log::debug!("Respawned {} particles of beacon {} from range shell", count, name);
    }

    /// Replace leading tag particles with shell points around an anchored
    /// beacon. Headings are redrawn uniformly.
    fn respawn_tags(&mut self, name: &str, shell: RangeShell, count: usize) {
        let Some(center) = self.beacons.get(name).map(|e| e.particles().mean().position()) else {
            return;
        };
        let prior = *self.beacons.config();
        let rng = &mut self.rng;
        self.tag.respawn(count, |_| {
            let p = prior.shell_point(&center, shell.range, shell.std_range, rng);
            let theta = rng.random_range(-PI..PI);
            TagState::new(p.x, p.y, p.z, theta)
        });
        self.stats.respawns += 1;
        log::debug!("Respawned {} tag particles around anchor {}", count, name);
    }

    fn refresh_tag_estimate(&mut self, t: f64) {
        let mean = self.tag.mean();
        self.tag_estimate = TagEstimate {
            t,
            x: mean.x,
            y: mean.y,
            z: mean.z,
            theta: mean.theta,
        };
    }
}

/// Log a weight collapse and tag the error with the set it came from.
fn recover(set: &str, e: LocalizeError, stats: &mut EngineStats) -> LocalizeError {
    stats.degeneracies += 1;
    let total = match e {
        LocalizeError::FilterDegenerate { total, .. } => total,
        _ => f64::NAN,
    };
    log::warn!(
        "Particle set {} degenerate (total weight {}), resetting to uniform",
        set,
        total
    );
    LocalizeError::FilterDegenerate {
        set: set.to_string(),
        total,
    }
}
