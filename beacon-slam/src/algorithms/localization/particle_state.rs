//! State spaces a particle can live on.
//!
//! The tag is a position plus heading; beacons are bare points. Each state
//! knows how to fold itself into a weighted mean and how to be roughened
//! after resampling.

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::core::math::{normalize_angle, sample_gaussian};

/// A point on the manifold sampled by a [`ParticleSet`](super::ParticleSet).
pub trait ParticleState:
    Copy + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned
{
    /// Weighted mean of `(state, weight)` pairs.
    ///
    /// Weights need not be normalized. When they sum to zero the plain
    /// (unweighted) mean is returned instead.
    fn weighted_mean<'a, I>(items: I) -> Self
    where
        I: Iterator<Item = (&'a Self, f64)> + Clone,
        Self: 'a;

    /// Position component.
    fn position(&self) -> Vector3<f64>;

    /// Add independent Gaussian jitter after resampling.
    fn roughen<R: Rng + ?Sized>(&mut self, sigma_xyz: f64, sigma_heading: f64, rng: &mut R);

    /// True if every component is finite.
    fn is_finite(&self) -> bool;
}

/// Tag hypothesis: position plus yaw of the odometry frame in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TagState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Yaw in radians, [-π, π]
    pub theta: f64,
}

impl TagState {
    /// Create a new tag state with normalized heading.
    #[inline]
    pub fn new(x: f64, y: f64, z: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            z,
            theta: normalize_angle(theta),
        }
    }
}

impl ParticleState for TagState {
    fn weighted_mean<'a, I>(items: I) -> Self
    where
        I: Iterator<Item = (&'a Self, f64)> + Clone,
    {
        let total: f64 = items.clone().map(|(_, w)| w).sum();
        let uniform = !(total.is_finite() && total > 1e-300);

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_z = 0.0;
        let mut sum_sin = 0.0;
        let mut sum_cos = 0.0;
        let mut norm = 0.0;

        for (s, w) in items {
            let w = if uniform { 1.0 } else { w };
            sum_x += w * s.x;
            sum_y += w * s.y;
            sum_z += w * s.z;
            sum_sin += w * s.theta.sin();
            sum_cos += w * s.theta.cos();
            norm += w;
        }

        if norm <= 0.0 {
            return Self::default();
        }

        // Circular mean: heading wraps, so average unit vectors instead
        Self {
            x: sum_x / norm,
            y: sum_y / norm,
            z: sum_z / norm,
            theta: sum_sin.atan2(sum_cos),
        }
    }

    #[inline]
    fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn roughen<R: Rng + ?Sized>(&mut self, sigma_xyz: f64, sigma_heading: f64, rng: &mut R) {
        self.x += sample_gaussian(rng, sigma_xyz);
        self.y += sample_gaussian(rng, sigma_xyz);
        self.z += sample_gaussian(rng, sigma_xyz);
        self.theta = normalize_angle(self.theta + sample_gaussian(rng, sigma_heading));
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.theta.is_finite()
    }
}

/// Beacon hypothesis: a fixed point in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BeaconState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BeaconState {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to a tag hypothesis.
    #[inline]
    pub fn distance_to(&self, tag: &TagState) -> f64 {
        let dx = tag.x - self.x;
        let dy = tag.y - self.y;
        let dz = tag.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl ParticleState for BeaconState {
    fn weighted_mean<'a, I>(items: I) -> Self
    where
        I: Iterator<Item = (&'a Self, f64)> + Clone,
    {
        let total: f64 = items.clone().map(|(_, w)| w).sum();
        let uniform = !(total.is_finite() && total > 1e-300);

        let mut sum = Vector3::zeros();
        let mut norm = 0.0;
        for (s, w) in items {
            let w = if uniform { 1.0 } else { w };
            sum += w * s.position();
            norm += w;
        }

        if norm <= 0.0 {
            return Self::default();
        }
        let mean = sum / norm;
        Self::new(mean.x, mean.y, mean.z)
    }

    #[inline]
    fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn roughen<R: Rng + ?Sized>(&mut self, sigma_xyz: f64, _sigma_heading: f64, rng: &mut R) {
        self.x += sample_gaussian(rng, sigma_xyz);
        self.y += sample_gaussian(rng, sigma_xyz);
        self.z += sample_gaussian(rng, sigma_xyz);
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
