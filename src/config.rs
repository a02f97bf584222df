// Physical parameters, controller gains, loop timing, topics
use std::time::Duration;

// Control loop frequency [Hz]
pub const LOOP_HZ: u64 = 100;

// Drive command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "balbot/cmd/drive"; // forward/yaw commands
pub const TOPIC_CMD_HALT: &str = "balbot/cmd/halt"; // emergency stop latch
pub const TOPIC_CMD_RESET: &str = "balbot/cmd/reset"; // clear halt / fallen latch
pub const TOPIC_RT_STATE: &str = "balbot/rt/state"; // state telemetry
pub const TOPIC_HEALTH: &str = "balbot/state/health"; // health status

// Serial link to the drive board
pub const BOARD_PORT: &str = "/dev/ttyACM0";
pub const BOARD_BAUD: u32 = 57600;

/// Robot physical and motor parameters.
///
/// Built once at startup and handed to the components that need them, so
/// tests can run the same code with alternate parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalParams {
    /// Pitch inertia [kg*m^2]
    pub pitch_inertia: f32,
    /// Yaw inertia [kg*m^2]
    pub yaw_inertia: f32,
    /// Robot mass [kg]
    pub mass: f32,
    /// Gravity [m/s^2]
    pub gravity: f32,
    /// CG distance above the axle [m]
    pub cg_distance: f32,
    /// Wheel base [m]
    pub wheel_base: f32,
    /// Wheel radius [m]
    pub wheel_radius: f32,
    /// Motor winding resistance [Ohm]
    pub motor_resistance: f32,
    /// Motor back-EMF constant [V/(rad/s)]
    pub back_emf: f32,
    /// Motor torque constant [N*m/A]
    pub torque_constant: f32,
    /// Battery voltage [V]
    pub battery_voltage: f32,
    /// Encoder resolution [cnt/rev]
    pub encoder_cpr: f32,
}

impl PhysicalParams {
    /// Parameters of the BalBot chassis.
    pub const fn balbot() -> Self {
        Self {
            pitch_inertia: 0.00238,
            yaw_inertia: 0.00150,
            mass: 0.95,
            gravity: 9.81,
            cg_distance: 0.028,
            wheel_base: 0.171,
            wheel_radius: 0.0336,
            motor_resistance: 12.0,
            back_emf: 0.30,
            torque_constant: 0.44,
            battery_voltage: 12.0,
            encoder_cpr: 1320.0,
        }
    }

    /// Velocity back-EMF [V/(m/s)]
    pub fn back_emf_per_mps(&self) -> f32 {
        self.back_emf / self.wheel_radius
    }

    /// Wheel base inverse [1/m]
    pub fn wheel_base_inv(&self) -> f32 {
        1.0 / self.wheel_base
    }

    /// Half wheel radius [m]
    pub fn half_wheel_radius(&self) -> f32 {
        self.wheel_radius / 2.0
    }
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self::balbot()
    }
}

/// Controller tuning. Constant for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ControllerGains {
    /// Yaw P-gain [V/(rad/s)]
    pub yaw_kp: f32,
    /// Yaw I-gain [V/rad]
    pub yaw_ki: f32,
    /// Yaw D-gain [V/(rad/s^2)]
    pub yaw_kd: f32,
    /// Yaw integral clamp [V]
    pub yaw_i_limit: f32,
    /// Pitch-rate gain [V/(rad/s)]
    pub ss_k1: f32,
    /// Pitch gain [V/rad]
    pub ss_k2: f32,
    /// Velocity gain [V/(m/s)]
    pub ss_k3: f32,
    /// |pitch| beyond which the robot is considered fallen [rad]
    pub pitch_fallen: f32,
}

impl ControllerGains {
    pub const fn balbot() -> Self {
        Self {
            yaw_kp: -0.120,
            yaw_ki: 25.7,
            yaw_kd: 0.0,
            yaw_i_limit: 2.0,
            ss_k1: -1.27,
            ss_k2: -13.3,
            ss_k3: -12.9,
            pitch_fallen: 0.6,
        }
    }
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self::balbot()
    }
}

/// Control period [s]
pub fn control_period() -> f32 {
    1.0 / LOOP_HZ as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        let p = PhysicalParams::balbot();
        assert!((p.back_emf_per_mps() - 0.30 / 0.0336).abs() < 1e-5);
        assert!((p.wheel_base_inv() - 1.0 / 0.171).abs() < 1e-5);
        assert!((p.half_wheel_radius() - 0.0168).abs() < 1e-6);
        assert!((control_period() - 0.01).abs() < 1e-6);
    }
}
