//! Estimate types published by the localization engine.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Estimated tag pose in the filter's world frame.
///
/// `theta` is the yaw between the odometry frame and the world frame, in
/// radians, normalized to [-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagEstimate {
    /// Timestamp of the latest motion sample (seconds)
    pub t: f64,
    /// X position in meters
    pub x: f64,
    /// Y position in meters
    pub y: f64,
    /// Z position in meters
    pub z: f64,
    /// Heading in radians
    pub theta: f64,
}

impl TagEstimate {
    /// Identity pose at the origin, at time zero.
    #[inline]
    pub fn identity() -> Self {
        Self {
            t: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            theta: 0.0,
        }
    }

    /// Position as a vector.
    #[inline]
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Pose as a rigid transform (yaw about +Z).
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.theta),
        )
    }

    /// True if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.t.is_finite()
            && self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.theta.is_finite()
    }
}

impl Default for TagEstimate {
    fn default() -> Self {
        Self::identity()
    }
}

/// Estimated beacon position in the filter's world frame.
///
/// Beacons are points; they carry no orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeaconEstimate {
    /// Timestamp of the estimate (seconds)
    pub t: f64,
    /// X position in meters
    pub x: f64,
    /// Y position in meters
    pub y: f64,
    /// Z position in meters
    pub z: f64,
}

impl BeaconEstimate {
    /// Position as a point.
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    /// Pose with identity rotation, for rendering.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::translation(self.x, self.y, self.z)
    }

    /// True if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
