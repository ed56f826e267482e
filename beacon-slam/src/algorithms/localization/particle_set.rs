//! Weighted sample population over a state space.
//!
//! Implements the generic half of sequential Monte Carlo: propagation,
//! reweighting, normalization, low-variance (systematic) resampling and the
//! weighted-mean estimate. The population size is fixed at construction.

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::particle_state::{ParticleState, TagState};
use crate::error::{LocalizeError, Result};

/// A single weighted hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle<S> {
    /// Hypothesized state.
    pub state: S,
    /// Importance weight (unnormalized between normalization passes).
    pub weight: f64,
}

impl<S> Particle<S> {
    /// Create a particle with unit weight.
    pub fn new(state: S) -> Self {
        Self { state, weight: 1.0 }
    }

    /// Create a particle with specified weight.
    pub fn with_weight(state: S, weight: f64) -> Self {
        Self { state, weight }
    }
}

/// Serializable copy of a particle set's population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "S: ParticleState")]
pub struct ParticleSetSnapshot<S> {
    pub generation: u64,
    pub particles: Vec<Particle<S>>,
}

/// Fixed-size weighted particle population.
#[derive(Debug, Clone)]
pub struct ParticleSet<S: ParticleState> {
    particles: Vec<Particle<S>>,
    generation: u64,
    mean: S,
}

impl<S: ParticleState> ParticleSet<S> {
    /// Build a set from initial states, each with weight `1/N`.
    ///
    /// Fails with [`LocalizeError::Config`] on an empty population.
    pub fn from_states<I: IntoIterator<Item = S>>(states: I) -> Result<Self> {
        let mut particles: Vec<Particle<S>> = states.into_iter().map(Particle::new).collect();
        if particles.is_empty() {
            return Err(LocalizeError::Config(
                "particle set needs at least one particle".to_string(),
            ));
        }
        let w = 1.0 / particles.len() as f64;
        for p in &mut particles {
            p.weight = w;
        }
        Ok(Self::from_particles(particles, 0))
    }

    /// Build a set of `n` copies of one state.
    pub fn filled(n: usize, state: S) -> Result<Self> {
        Self::from_states(std::iter::repeat_n(state, n))
    }

    fn from_particles(particles: Vec<Particle<S>>, generation: u64) -> Self {
        let mean = Self::compute_mean(&particles);
        Self {
            particles,
            generation,
            mean,
        }
    }

    /// Restore a set from a snapshot.
    pub fn from_snapshot(snapshot: ParticleSetSnapshot<S>) -> Result<Self> {
        if snapshot.particles.is_empty() {
            return Err(LocalizeError::Config(
                "snapshot contains no particles".to_string(),
            ));
        }
        Ok(Self::from_particles(snapshot.particles, snapshot.generation))
    }

    /// Copy the population for serialization.
    pub fn snapshot(&self) -> ParticleSetSnapshot<S> {
        ParticleSetSnapshot {
            generation: self.generation,
            particles: self.particles.clone(),
        }
    }

    /// Number of particles (fixed for the lifetime of the set).
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Always false; sets are never empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Current particles (for visualization and pairing).
    #[inline]
    pub fn particles(&self) -> &[Particle<S>] {
        &self.particles
    }

    /// Number of propagate/reweight/resample passes applied so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached weighted mean, refreshed after every mutation.
    #[inline]
    pub fn mean(&self) -> S {
        self.mean
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).sum()
    }

    /// Effective sample size, `(Σw)² / Σw²`.
    ///
    /// Equals `1 / Σw²` once weights are normalized. Returns 0 for a
    /// degenerate population.
    pub fn ess(&self) -> f64 {
        let (sum, sum_sq) = self
            .particles
            .iter()
            .fold((0.0, 0.0), |(s, ss), p| (s + p.weight, ss + p.weight * p.weight));
        if sum_sq > 0.0 && sum_sq.is_finite() {
            sum * sum / sum_sq
        } else {
            0.0
        }
    }

    /// True when `ESS <= ratio * N` (boundary inclusive).
    pub fn needs_resample(&self, ratio: f64) -> bool {
        self.ess() <= ratio * self.len() as f64
    }

    /// Apply a state transition to every particle. Weights are untouched.
    pub fn propagate<F: FnMut(&mut S)>(&mut self, mut transition: F) {
        for p in &mut self.particles {
            transition(&mut p.state);
        }
        self.refresh();
    }

    /// Multiply every weight by `likelihood(state)`. Does not normalize.
    pub fn reweight<F: FnMut(&S) -> f64>(&mut self, mut likelihood: F) {
        for p in &mut self.particles {
            p.weight *= likelihood(&p.state);
        }
        self.refresh();
    }

    /// Multiply weight `i` by `likelihoods[i]`. Does not normalize.
    ///
    /// Used when the likelihood depends on a paired particle in another set.
    pub fn apply_likelihoods(&mut self, likelihoods: &[f64]) {
        debug_assert_eq!(likelihoods.len(), self.particles.len());
        for (p, l) in self.particles.iter_mut().zip(likelihoods) {
            p.weight *= l;
        }
        self.refresh();
    }

    /// Scale weights to sum to one.
    ///
    /// Fails with [`LocalizeError::FilterDegenerate`] when the total is zero
    /// or non-finite; weights are left as they were so the caller can
    /// decide how to recover.
    pub fn normalize(&mut self) -> Result<()> {
        let total = self.total_weight();
        if !(total.is_finite() && total > 0.0) {
            return Err(LocalizeError::FilterDegenerate {
                set: String::new(),
                total,
            });
        }
        for p in &mut self.particles {
            p.weight /= total;
        }
        Ok(())
    }

    /// Reset every weight to `1/N`.
    pub fn reset_weights(&mut self) {
        let w = 1.0 / self.particles.len() as f64;
        for p in &mut self.particles {
            p.weight = w;
        }
        self.mean = Self::compute_mean(&self.particles);
    }

    /// Low-variance (systematic) resampling.
    ///
    /// Draws a single offset `u ~ U[0, 1/N)` and selects the particle whose
    /// cumulative weight interval contains each of `u + k/N`. Resulting
    /// weights are exactly `1/N`. Returns the ancestor index of every new
    /// particle so paired sets can follow the same lineage.
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<usize> {
        let n = self.particles.len();
        let cumulative = self.cumulative_weights();

        let offset: f64 = rng.random::<f64>();
        let mut ancestors = Vec::with_capacity(n);
        let mut idx = 0;
        for k in 0..n {
            let r = (offset + k as f64) / n as f64;
            while r > cumulative[idx] && idx < n - 1 {
                idx += 1;
            }
            ancestors.push(idx);
        }

        let w = 1.0 / n as f64;
        let resampled = ancestors
            .iter()
            .map(|&a| Particle::with_weight(self.particles[a].state, w))
            .collect();
        self.particles = resampled;
        self.refresh();
        ancestors
    }

    /// Resample only if `ESS <= ratio * N`; returns the ancestors if it did.
    pub fn resample_if_needed<R: Rng + ?Sized>(
        &mut self,
        ratio: f64,
        rng: &mut R,
    ) -> Option<Vec<usize>> {
        if self.needs_resample(ratio) {
            Some(self.resample(rng))
        } else {
            None
        }
    }

    /// Reorder the population along another set's resampling lineage.
    ///
    /// Particle `i` becomes a copy of former particle `ancestors[i]` with
    /// weight `1/N`. The resampled set already carries the pair weight, so
    /// weights held here are discarded.
    pub fn gather(&mut self, ancestors: &[usize]) {
        debug_assert_eq!(ancestors.len(), self.particles.len());
        let w = 1.0 / self.particles.len() as f64;
        let gathered: Vec<Particle<S>> = ancestors
            .iter()
            .map(|&a| Particle::with_weight(self.particles[a].state, w))
            .collect();
        self.particles = gathered;
        self.refresh();
    }

    /// Replace the first `count` particles with fresh states from `spawn`.
    ///
    /// `spawn` receives the particle index. Replaced particles get weight
    /// `1/N`, so call this right after a resample.
    pub fn respawn<F: FnMut(usize) -> S>(&mut self, count: usize, mut spawn: F) {
        let n = self.particles.len();
        let w = 1.0 / n as f64;
        for (i, p) in self.particles.iter_mut().take(count.min(n)).enumerate() {
            *p = Particle::with_weight(spawn(i), w);
        }
        self.refresh();
    }

    /// Jitter every particle independently.
    pub fn roughen<R: Rng + ?Sized>(&mut self, sigma_xyz: f64, sigma_heading: f64, rng: &mut R) {
        if sigma_xyz <= 0.0 && sigma_heading <= 0.0 {
            return;
        }
        for p in &mut self.particles {
            p.state.roughen(sigma_xyz, sigma_heading, rng);
        }
        self.mean = Self::compute_mean(&self.particles);
    }

    /// Weighted per-axis variance of particle positions.
    pub fn variance(&self) -> Vector3<f64> {
        let mean = self.mean.position();
        let total = self.total_weight();
        let uniform = !(total.is_finite() && total > 0.0);
        let norm = if uniform { self.len() as f64 } else { total };

        let mut acc = Vector3::zeros();
        for p in &self.particles {
            let w = if uniform { 1.0 } else { p.weight };
            let d = p.state.position() - mean;
            acc += w * d.component_mul(&d);
        }
        acc / norm
    }

    fn cumulative_weights(&self) -> Vec<f64> {
        let n = self.particles.len();
        let mut cumulative = Vec::with_capacity(n);
        let mut sum = 0.0;
        for p in &self.particles {
            sum += p.weight;
            cumulative.push(sum);
        }

        if sum.is_finite() && sum > 0.0 {
            for c in &mut cumulative {
                *c /= sum;
            }
        } else {
            // Degenerate weights: treat as uniform
            for (i, c) in cumulative.iter_mut().enumerate() {
                *c = (i + 1) as f64 / n as f64;
            }
        }
        cumulative
    }

    fn refresh(&mut self) {
        self.generation += 1;
        self.mean = Self::compute_mean(&self.particles);
    }

    fn compute_mean(particles: &[Particle<S>]) -> S {
        S::weighted_mean(particles.iter().map(|p| (&p.state, p.weight)))
    }
}

impl ParticleSet<TagState> {
    /// Kernel bandwidth for heading jitter, `sqrt(-ln R² / ESS)`.
    ///
    /// `R` is the length of the weighted mean heading vector, clamped away
    /// from 0 and 1. Concentrated headings give a narrow kernel.
    pub fn heading_bandwidth(&self) -> f64 {
        let ess = self.ess();
        if ess <= 0.0 {
            return 0.0;
        }
        let (mut c, mut s, mut total) = (0.0, 0.0, 0.0);
        for p in &self.particles {
            c += p.weight * p.state.theta.cos();
            s += p.weight * p.state.theta.sin();
            total += p.weight;
        }
        c /= total;
        s /= total;
        let r2 = (c * c + s * s).clamp(1e-10, 1.0 - 1e-10);
        (-r2.ln() / ess).sqrt()
    }
}
