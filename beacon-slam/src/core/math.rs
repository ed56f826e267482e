//! Mathematical primitives shared by the estimator.
//!
//! Angle arithmetic, Gaussian helpers and uniform sampling on spheres.

use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use beacon_slam::core::math::normalize_angle;
/// use std::f64::consts::PI;
///
/// assert!((normalize_angle(2.5 * PI) - 0.5 * PI).abs() < 1e-9);
/// assert!((normalize_angle(-2.5 * PI) + 0.5 * PI).abs() < 1e-9);
/// ```
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Unnormalized Gaussian kernel `exp(-½ (residual / sigma)²)`.
///
/// Peaks at 1.0 for a zero residual. A non-positive sigma collapses the
/// kernel to an indicator of an exact match.
#[inline]
pub fn gaussian_kernel(residual: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return if residual == 0.0 { 1.0 } else { 0.0 };
    }
    let z = residual / sigma;
    (-0.5 * z * z).exp()
}

/// Sample from a zero-mean Gaussian with the given standard deviation.
#[inline]
pub fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    if sigma < 1e-12 {
        return 0.0;
    }
    let n: f64 = rng.sample(StandardNormal);
    n * sigma
}

/// Uniformly distributed unit vector on the sphere.
///
/// Elevation is drawn as `asin(2u - 1)` so that points do not bunch up at
/// the poles.
pub fn sample_unit_sphere<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64, f64) {
    let elevation = (2.0 * rng.random::<f64>() - 1.0).asin();
    let azimuth = 2.0 * PI * rng.random::<f64>();
    let c = elevation.cos();
    (c * azimuth.cos(), c * azimuth.sin(), elevation.sin())
}
