//! Lazily populated set of beacon particle sets.
//!
//! A beacon gets its particle set the first time it is heard, spawned
//! around the tag's current belief. Entries are never removed; discovery
//! order is preserved for iteration and for [`BeaconRegistry::names`].

use std::collections::HashMap;

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algorithms::localization::{BeaconState, ParticleSet, ParticleState, TagState};
use crate::core::math::sample_unit_sphere;
use crate::core::types::BeaconEstimate;
use crate::error::{LocalizeError, Result};

/// Configuration for beacon priors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconPriorConfig {
    /// Radius of the uniform ball used for the volume prior (meters).
    /// Should cover the radio range at which beacons are first heard.
    pub volume_radius: f64,

    /// Half-width of the shell prior in units of the range std.
    pub shell_sigmas: f64,

    /// Ranges at or beyond this never trigger a shell respawn (meters).
    /// Typical: 4.0. Long ranges put the shell too far from the tag to help.
    pub respawn_max_range: f64,
}

impl Default for BeaconPriorConfig {
    fn default() -> Self {
        Self {
            volume_radius: 5.0,
            shell_sigmas: 3.0,
            respawn_max_range: 4.0,
        }
    }
}

impl BeaconPriorConfig {
    /// One point on the shell of radius `range ± shell_sigmas·std_range`
    /// around `center`. The radius is clamped at zero.
    pub fn shell_point<R: Rng + ?Sized>(
        &self,
        center: &Vector3<f64>,
        range: f64,
        std_range: f64,
        rng: &mut R,
    ) -> BeaconState {
        let half_width = self.shell_sigmas.max(0.0) * std_range;
        let r = (range + half_width * (2.0 * rng.random::<f64>() - 1.0)).max(0.0);
        let (ux, uy, uz) = sample_unit_sphere(rng);
        BeaconState::new(center.x + r * ux, center.y + r * uy, center.z + r * uz)
    }
}

/// Shape of the initial belief for a newly heard beacon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeaconPrior {
    /// Uniform in a ball around the tag's current estimate.
    Volume,
    /// Spherical shell of radius `range ± k·std_range` around each paired
    /// tag particle.
    Shell { range: f64, std_range: f64 },
}

/// One registered beacon.
#[derive(Debug, Clone)]
pub struct BeaconEntry {
    name: String,
    particles: ParticleSet<BeaconState>,
    estimate: BeaconEstimate,
    anchored: bool,
    observations: u64,
}

impl BeaconEntry {
    /// Beacon identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Beacon particle set.
    pub fn particles(&self) -> &ParticleSet<BeaconState> {
        &self.particles
    }

    /// Mutable beacon particle set (engine only).
    pub(crate) fn particles_mut(&mut self) -> &mut ParticleSet<BeaconState> {
        &mut self.particles
    }

    /// Last published estimate.
    pub fn estimate(&self) -> BeaconEstimate {
        self.estimate
    }

    /// True if the position is fixed and never re-estimated.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Number of range/RSSI observations applied.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub(crate) fn record_observation(&mut self) {
        self.observations += 1;
    }

    /// Recompute the cached estimate from the particle mean, keeping the
    /// time of the last observation.
    pub(crate) fn refresh_position(&mut self) {
        let t = self.estimate.t;
        self.refresh_estimate(t);
    }

    /// Recompute the cached estimate from the particle mean.
    pub(crate) fn refresh_estimate(&mut self, t: f64) {
        let mean = self.particles.mean();
        self.estimate = BeaconEstimate {
            t,
            x: mean.x,
            y: mean.y,
            z: mean.z,
        };
    }
}

/// Beacon particle sets keyed by identifier, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct BeaconRegistry {
    config: BeaconPriorConfig,
    entries: Vec<BeaconEntry>,
    index: HashMap<String, usize>,
}

impl BeaconRegistry {
    /// Create an empty registry.
    pub fn new(config: BeaconPriorConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BeaconPriorConfig {
        &self.config
    }

    /// Number of known beacons.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no beacon has been heard yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `name` has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Known identifiers in discovery order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Look up a beacon.
    pub fn get(&self, name: &str) -> Option<&BeaconEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Look up a beacon for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut BeaconEntry> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Iterate entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &BeaconEntry> {
        self.entries.iter()
    }

    /// Iterate entries mutably in discovery order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BeaconEntry> {
        self.entries.iter_mut()
    }

    /// Return the entry for `name`, creating it from `prior` if unseen.
    ///
    /// The new set has as many particles as `tags` so that beacon particle
    /// `i` pairs with tag particle `i`. An existing entry is returned
    /// unchanged and `prior` is ignored.
    pub fn get_or_create<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        prior: BeaconPrior,
        tags: &ParticleSet<TagState>,
        t: f64,
        rng: &mut R,
    ) -> Result<&mut BeaconEntry> {
        if let Some(&i) = self.index.get(name) {
            return Ok(&mut self.entries[i]);
        }
        if name.is_empty() {
            return Err(LocalizeError::invalid("beacon identifier is empty"));
        }

        let particles = match prior {
            BeaconPrior::Volume => self.spawn_volume(tags, rng)?,
            BeaconPrior::Shell { range, std_range } => {
                self.spawn_shell(tags, range, std_range, rng)?
            }
        };
        log::info!(
            "New beacon {} ({:?} prior, {} particles)",
            name,
            prior,
            particles.len()
        );
        Ok(self.insert(name, particles, false, t))
    }

    /// Register `name` at a known position, or pin an existing beacon there.
    ///
    /// Anchored beacons are excluded from reweighting and roughening.
    pub fn anchor(
        &mut self,
        name: &str,
        position: BeaconState,
        num_particles: usize,
        t: f64,
    ) -> Result<&mut BeaconEntry> {
        if name.is_empty() {
            return Err(LocalizeError::invalid("beacon identifier is empty"));
        }
        if !position.is_finite() {
            return Err(LocalizeError::invalid(format!(
                "anchor position for {} is not finite",
                name
            )));
        }
        let particles = ParticleSet::filled(num_particles, position)?;

        if let Some(&i) = self.index.get(name) {
            let entry = &mut self.entries[i];
            entry.particles = particles;
            entry.anchored = true;
            entry.refresh_estimate(t);
            log::info!(
                "Beacon {} anchored at ({:.3}, {:.3}, {:.3})",
                name,
                position.x,
                position.y,
                position.z
            );
            return Ok(entry);
        }

        log::info!(
            "Anchored beacon {} at ({:.3}, {:.3}, {:.3})",
            name,
            position.x,
            position.y,
            position.z
        );
        Ok(self.insert(name, particles, true, t))
    }

    fn insert(
        &mut self,
        name: &str,
        particles: ParticleSet<BeaconState>,
        anchored: bool,
        t: f64,
    ) -> &mut BeaconEntry {
        let mut entry = BeaconEntry {
            name: name.to_string(),
            particles,
            estimate: BeaconEstimate {
                t,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            anchored,
            observations: 0,
        };
        entry.refresh_estimate(t);

        let i = self.entries.len();
        self.entries.push(entry);
        self.index.insert(name.to_string(), i);
        &mut self.entries[i]
    }

    fn spawn_volume<R: Rng + ?Sized>(
        &self,
        tags: &ParticleSet<TagState>,
        rng: &mut R,
    ) -> Result<ParticleSet<BeaconState>> {
        let center = tags.mean();
        let radius = self.config.volume_radius.max(0.0);
        let states: Vec<BeaconState> = (0..tags.len())
            .map(|_| {
                // cbrt keeps the density uniform over the ball's volume
                let r = radius * rng.random::<f64>().cbrt();
                let (ux, uy, uz) = sample_unit_sphere(rng);
                BeaconState::new(center.x + r * ux, center.y + r * uy, center.z + r * uz)
            })
            .collect();
        ParticleSet::from_states(states)
    }

    fn spawn_shell<R: Rng + ?Sized>(
        &self,
        tags: &ParticleSet<TagState>,
        range: f64,
        std_range: f64,
        rng: &mut R,
    ) -> Result<ParticleSet<BeaconState>> {
        let states: Vec<BeaconState> = tags
            .particles()
            .iter()
            .map(|tp| {
                self.config
                    .shell_point(&tp.state.position(), range, std_range, rng)
            })
            .collect();
        ParticleSet::from_states(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tags_at(x: f64, n: usize) -> ParticleSet<TagState> {
        ParticleSet::filled(n, TagState::new(x, 0.0, 0.0, 0.0)).unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut registry = BeaconRegistry::new(BeaconPriorConfig::default());
        let tags = tags_at(0.0, 50);

        let first = registry
            .get_or_create("B1", BeaconPrior::Volume, &tags, 0.0, &mut rng)
            .unwrap()
            .estimate();
        let again = registry
            .get_or_create("B1", BeaconPrior::Volume, &tags, 1.0, &mut rng)
            .unwrap()
            .estimate();
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_in_discovery_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = BeaconRegistry::default();
        let tags = tags_at(0.0, 10);
        for name in ["C", "A", "B", "A"] {
            registry
                .get_or_create(name, BeaconPrior::Volume, &tags, 0.0, &mut rng)
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["C", "A", "B"]);
        assert!(registry.contains("B"));
        assert!(!registry.contains("D"));
    }

    #[test]
    fn test_volume_prior_stays_inside_ball() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut registry = BeaconRegistry::new(BeaconPriorConfig {
            volume_radius: 2.0,
            ..Default::default()
        });
        let tags = tags_at(10.0, 200);
        let entry = registry
            .get_or_create("B1", BeaconPrior::Volume, &tags, 0.0, &mut rng)
            .unwrap();

        assert_eq!(entry.particles().len(), 200);
        for p in entry.particles().particles() {
            let d = p.state.distance_to(&TagState::new(10.0, 0.0, 0.0, 0.0));
            assert!(d <= 2.0 + 1e-9, "particle {} m from tag", d);
        }
        let est = entry.estimate();
        assert!(est.is_finite());
        assert!((est.x - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_shell_prior_pairs_with_tag_particles() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut registry = BeaconRegistry::default();
        let tags = ParticleSet::from_states((0..100).map(|i| TagState::new(i as f64, 0.0, 0.0, 0.0)))
            .unwrap();
        let entry = registry
            .get_or_create(
                "B1",
                BeaconPrior::Shell {
                    range: 5.0,
                    std_range: 0.1,
                },
                &tags,
                0.0,
                &mut rng,
            )
            .unwrap();

        for (tp, bp) in tags.particles().iter().zip(entry.particles().particles()) {
            let d = bp.state.distance_to(&tp.state);
            assert!((4.7 - 1e-9..=5.3 + 1e-9).contains(&d), "shell radius {}", d);
        }
    }

    #[test]
    fn test_shell_radius_clamped_at_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut registry = BeaconRegistry::default();
        let tags = tags_at(0.0, 100);
        let entry = registry
            .get_or_create(
                "B1",
                BeaconPrior::Shell {
                    range: 0.0,
                    std_range: 1.0,
                },
                &tags,
                0.0,
                &mut rng,
            )
            .unwrap();
        for p in entry.particles().particles() {
            assert!(p.state.x.is_finite());
        }
    }

    #[test]
    fn test_shell_point_radius() {
        let mut rng = StdRng::seed_from_u64(21);
        let config = BeaconPriorConfig::default();
        let center = Vector3::new(1.0, -2.0, 0.5);
        for _ in 0..200 {
            let p = config.shell_point(&center, 3.0, 0.1, &mut rng);
            let d = (p.position() - center).norm();
            assert!((2.7 - 1e-9..=3.3 + 1e-9).contains(&d), "shell radius {}", d);
        }
    }

    #[test]
    fn test_anchor_collapses_particles() {
        let mut registry = BeaconRegistry::default();
        let entry = registry
            .anchor("A1", BeaconState::new(1.0, 2.0, 3.0), 20, 0.5)
            .unwrap();
        assert!(entry.is_anchored());
        assert_eq!(entry.particles().len(), 20);
        let est = entry.estimate();
        assert_relative_eq!(est.x, 1.0);
        assert_relative_eq!(est.y, 2.0);
        assert_relative_eq!(est.z, 3.0);
        assert_relative_eq!(entry.particles().variance().norm(), 0.0);
    }

    #[test]
    fn test_anchor_existing_beacon() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut registry = BeaconRegistry::default();
        let tags = tags_at(0.0, 30);
        registry
            .get_or_create("B1", BeaconPrior::Volume, &tags, 0.0, &mut rng)
            .unwrap();
        registry
            .anchor("B1", BeaconState::new(4.0, 0.0, 0.0), 30, 1.0)
            .unwrap();
        assert_eq!(registry.len(), 1);
        let entry = registry.get("B1").unwrap();
        assert!(entry.is_anchored());
        assert_relative_eq!(entry.estimate().x, 4.0);
    }

    #[test]
    fn test_invalid_names_and_positions_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut registry = BeaconRegistry::default();
        let tags = tags_at(0.0, 10);
        assert!(
            registry
                .get_or_create("", BeaconPrior::Volume, &tags, 0.0, &mut rng)
                .is_err()
        );
        assert!(
            registry
                .anchor("A", BeaconState::new(f64::NAN, 0.0, 0.0), 10, 0.0)
                .is_err()
        );
        assert!(registry.is_empty());
    }
}
