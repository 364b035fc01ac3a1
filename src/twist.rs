//! Velocity command message types.
//!
//! Mirrors the `geometry_msgs/Twist` wire shape: linear and angular
//! three-vectors. The bridge only drives `linear.x` (forward speed) and
//! `angular.z` (turn rate); the remaining components stay zero.

use serde::{Deserialize, Serialize};

/// Three-component vector (`geometry_msgs/Vector3` shape)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Velocity command sent to the robot's motion controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// Message type advertised on the wire
    pub const ROS_TYPE: &'static str = "geometry_msgs/Twist";

    /// Zero velocity command (safe stop)
    pub fn zero() -> Self {
        Self::default()
    }

    /// True if every component is zero
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Multiply the driven components in place
    pub fn scale(&mut self, factor: f64) {
        self.linear.x *= factor;
        self.angular.z *= factor;
    }
}
