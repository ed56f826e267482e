//! Alignment of the filter's world frame with the visual tracking frame.
//!
//! The tracking subsystem reports device poses in its own, slowly drifting
//! frame. The filter estimates the same device in a frame anchored by the
//! beacons. Renderers need beacon/world poses in the tracking frame, so the
//! reconciler keeps a `world → tracking` transform chosen such that the
//! tag's own estimate maps exactly onto the live device pose. Any drift
//! between the two frames is absorbed by the transform rather than by the
//! rendered device.
//!
//! The transform is recomputed from scratch on every update, never
//! integrated.
//!
//! ```text
//! T_od = S · T_vd                      device in tracking frame, filter axes
//! T_wd = (p_tag, [Rz(θ_tag)] · R_od)   device in filter world
//! T_vw = S⁻¹ · T_od · T_wd⁻¹           world → tracking
//! ```

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::core::types::TagEstimate;
use crate::error::{LocalizeError, Result};

/// Fixed rotation from tracking-frame axes to filter axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisConvention {
    /// Both frames use the same axes.
    Identity,
    /// Tracking frame is Y-up (x right, y up, z backward); the filter is
    /// Z-up. Maps `(x, y, z)` to `(x, -z, y)`.
    #[default]
    YUpToZUp,
    /// Arbitrary rotation given as a quaternion (normalized on use).
    Quaternion { w: f64, i: f64, j: f64, k: f64 },
}

impl AxisConvention {
    /// Rotation taking tracking-frame coordinates to filter coordinates.
    pub fn rotation(&self) -> Result<UnitQuaternion<f64>> {
        match *self {
            AxisConvention::Identity => Ok(UnitQuaternion::identity()),
            AxisConvention::YUpToZUp => Ok(UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                FRAC_PI_2,
            )),
            AxisConvention::Quaternion { w, i, j, k } => {
                let q = Quaternion::new(w, i, j, k);
                let norm = q.norm();
                if !norm.is_finite() || norm < 1e-9 {
                    return Err(LocalizeError::Config(format!(
                        "axis quaternion must be non-zero and finite, got ({w}, {i}, {j}, {k})"
                    )));
                }
                Ok(UnitQuaternion::from_quaternion(q))
            }
        }
    }
}

/// Configuration for the frame reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Axis convention of the tracking frame.
    pub axis_convention: AxisConvention,

    /// Also absorb the filter's heading estimate into the transform.
    ///
    /// When false only position is reconciled and the tracking frame's
    /// orientation is trusted as-is.
    pub correct_heading: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            axis_convention: AxisConvention::YUpToZUp,
            correct_heading: false,
        }
    }
}

/// Reconciler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ReconcilerState {
    /// No tracking sample received yet.
    #[default]
    Uninitialized,
    /// Transform available.
    Tracking {
        /// Maps filter-world poses into the tracking frame.
        world_to_tracking: Isometry3<f64>,
        /// Timestamp of the tag estimate used for the transform.
        t: f64,
    },
}

/// Keeps the filter-world → tracking-frame transform current.
#[derive(Debug, Clone)]
pub struct FrameReconciler {
    config: ReconcilerConfig,
    axis: UnitQuaternion<f64>,
    state: ReconcilerState,
}

impl FrameReconciler {
    /// Create a reconciler in the `Uninitialized` state.
    ///
    /// Fails if the configured axis convention is not a valid rotation.
    pub fn new(config: ReconcilerConfig) -> Result<Self> {
        let axis = config.axis_convention.rotation()?;
        Ok(Self {
            config,
            axis,
            state: ReconcilerState::Uninitialized,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    /// True once at least one tracking sample has been reconciled.
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, ReconcilerState::Tracking { .. })
    }

    /// Express a tracking-frame pose in filter axes (same origin).
    pub fn to_filter_axes(&self, tracking_pose: &Isometry3<f64>) -> Isometry3<f64> {
        let swap = Isometry3::from_parts(Translation3::identity(), self.axis);
        swap * tracking_pose
    }

    /// Recompute the transform from a live device pose and the filter's
    /// current tag estimate.
    pub fn update(&mut self, tracking_pose: &Isometry3<f64>, tag: &TagEstimate) -> Isometry3<f64> {
        let swap = Isometry3::from_parts(Translation3::identity(), self.axis);
        let device_in_odom = swap * tracking_pose;

        let rotation = if self.config.correct_heading {
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), tag.theta) * device_in_odom.rotation
        } else {
            device_in_odom.rotation
        };
        let device_in_world =
            Isometry3::from_parts(Translation3::new(tag.x, tag.y, tag.z), rotation);

        let world_to_tracking = swap.inverse() * device_in_odom * device_in_world.inverse();

        if !self.is_tracking() {
            log::info!("Frame reconciler tracking (t={:.3})", tag.t);
        }
        self.state = ReconcilerState::Tracking {
            world_to_tracking,
            t: tag.t,
        };
        world_to_tracking
    }

    /// Current world → tracking transform.
    pub fn transform(&self) -> Result<Isometry3<f64>> {
        match self.state {
            ReconcilerState::Tracking {
                world_to_tracking, ..
            } => Ok(world_to_tracking),
            ReconcilerState::Uninitialized => Err(LocalizeError::ReconcilerUninitialized),
        }
    }

    /// Map a filter-world pose into the tracking frame for rendering.
    pub fn project(&self, world_pose: &Isometry3<f64>) -> Result<Isometry3<f64>> {
        Ok(self.transform()? * world_pose)
    }

    /// Map a filter-world point into the tracking frame.
    pub fn project_point(&self, world_point: &Point3<f64>) -> Result<Point3<f64>> {
        Ok(self.transform()? * world_point)
    }

    /// Forget the transform.
    pub fn reset(&mut self) {
        self.state = ReconcilerState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tag(x: f64, y: f64, z: f64, theta: f64) -> TagEstimate {
        TagEstimate {
            t: 1.0,
            x,
            y,
            z,
            theta,
        }
    }

    fn tracking_pose(x: f64, y: f64, z: f64, yaw: f64) -> Isometry3<f64> {
        // Yaw about the tracking frame's up axis (Y)
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
        )
    }

    #[test]
    fn test_axis_swap() {
        let r = AxisConvention::YUpToZUp.rotation().unwrap();
        let p = r * Point3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, -3.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_custom_quaternion_validated() {
        let bad = AxisConvention::Quaternion {
            w: 0.0,
            i: 0.0,
            j: 0.0,
            k: 0.0,
        };
        assert!(FrameReconciler::new(ReconcilerConfig {
            axis_convention: bad,
            correct_heading: false,
        })
        .is_err());
    }

    #[test]
    fn test_uninitialized_projection_fails() {
        let reconciler = FrameReconciler::new(ReconcilerConfig::default()).unwrap();
        assert!(!reconciler.is_tracking());
        assert!(matches!(
            reconciler.project(&Isometry3::identity()),
            Err(LocalizeError::ReconcilerUninitialized)
        ));
    }

    #[test]
    fn test_tag_projects_onto_live_device_pose() {
        for correct_heading in [false, true] {
            let mut reconciler = FrameReconciler::new(ReconcilerConfig {
                correct_heading,
                ..Default::default()
            })
            .unwrap();
            let live = tracking_pose(0.3, 1.2, -2.0, 0.4);
            let est = tag(5.0, -1.0, 0.7, 0.25);
            reconciler.update(&live, &est);

            // Tag pose in the world, built the same way the reconciler does
            let device_in_odom = reconciler.to_filter_axes(&live);
            let rot = if correct_heading {
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), est.theta)
                    * device_in_odom.rotation
            } else {
                device_in_odom.rotation
            };
            let tag_world = Isometry3::from_parts(Translation3::new(est.x, est.y, est.z), rot);

            let drawn = reconciler.project(&tag_world).unwrap();
            assert_relative_eq!(drawn.translation.vector, live.translation.vector, epsilon = 1e-9);
            assert_relative_eq!(drawn.rotation.angle_to(&live.rotation), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_position_only_keeps_relative_offsets() {
        let mut reconciler = FrameReconciler::new(ReconcilerConfig {
            axis_convention: AxisConvention::Identity,
            correct_heading: false,
        })
        .unwrap();
        let live = Isometry3::translation(1.0, 1.0, 1.0);
        reconciler.update(&live, &tag(10.0, 0.0, 0.0, 1.0));

        // A beacon 2 m ahead of the tag in the world is 2 m ahead of the device
        let beacon = reconciler
            .project_point(&Point3::new(12.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(beacon, Point3::new(3.0, 1.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_heading_correction_rotates_world() {
        let mut reconciler = FrameReconciler::new(ReconcilerConfig {
            axis_convention: AxisConvention::Identity,
            correct_heading: true,
        })
        .unwrap();
        reconciler.update(&Isometry3::identity(), &tag(0.0, 0.0, 0.0, FRAC_PI_2));

        // World +Y is odometry +X when the odometry frame is yawed by 90°
        let p = reconciler.project_point(&Point3::new(0.0, 1.0, 0.0)).unwrap();
        assert_relative_eq!(p, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_transform_is_recomputed_not_integrated() {
        let mut reconciler = FrameReconciler::new(ReconcilerConfig::default()).unwrap();
        let live = tracking_pose(0.5, 0.0, 0.5, 0.1);
        let est = tag(2.0, 2.0, 0.0, 0.0);

        let first = reconciler.update(&live, &est);
        for _ in 0..10 {
            reconciler.update(&tracking_pose(3.0, 1.0, -1.0, 1.0), &tag(-4.0, 0.0, 1.0, 0.5));
        }
        let again = reconciler.update(&live, &est);
        assert_relative_eq!(first, again, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let mut reconciler = FrameReconciler::new(ReconcilerConfig::default()).unwrap();
        reconciler.update(&Isometry3::identity(), &TagEstimate::identity());
        assert!(reconciler.is_tracking());
        reconciler.reset();
        assert_eq!(*reconciler.state(), ReconcilerState::Uninitialized);
    }
}
