// Wire types exchanged with teleop and telemetry consumers

use serde::{Deserialize, Serialize};

/// Command from teleop/scripts -> runtime.
///
/// `forward` is the commanded forward velocity [m/s], `yaw_rate` the
/// commanded turn rate [rad/s] (positive = counter-clockwise). Zero on both
/// axes means balance in place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DriveCommand {
    pub forward: f32,
    pub yaw_rate: f32,
}

/// Per-wheel voltage command produced by the controller each tick [V].
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq)]
pub struct MotorCommand {
    pub left: f32,
    pub right: f32,
}

impl MotorCommand {
    /// Build a command with both wheels clamped to [-limit, limit].
    pub fn clamped(left: f32, right: f32, limit: f32) -> Self {
        Self {
            left: left.clamp(-limit, limit),
            right: right.clamp(-limit, limit),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// State telemetry published every tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateTelemetry {
    /// Forward tilt from vertical [rad]
    pub pitch: f32,
    /// Pitch rate [rad/s]
    pub pitch_rate: f32,
    /// Turn rate [rad/s]
    pub yaw_rate: f32,
    /// Forward velocity [m/s]
    pub velocity: f32,
    /// Applied wheel voltages [V]
    pub left_voltage: f32,
    pub right_voltage: f32,
    /// True while the controller is actively balancing
    pub upright: bool,
}

/// Health status published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fallen,
    Halted,
}
