// Balance controller: state-space law + yaw PID
//
// Two modes. Upright computes a common-mode voltage from the state-space law
// (with back-EMF feedforward) and a differential voltage from the yaw PID,
// then splits them across the wheels. Fallen forces zero output and latches
// until an explicit reset; the yaw integral is cleared on entry so it cannot
// wind up while the robot is down.

use tracing::{info, warn};

use crate::config::{ControllerGains, PhysicalParams};
use crate::control::pid::{Pid, PidGains};
use crate::estimator::RobotState;
use crate::messages::{DriveCommand, MotorCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Actively balancing
    Upright,
    /// Tipped past the safety threshold; outputs forced to zero
    Fallen,
}

pub struct BalanceController {
    gains: ControllerGains,
    /// Velocity back-EMF feedforward [V/(m/s)]
    emf_feedforward: f32,
    /// Battery voltage clamp [V]
    v_limit: f32,
    yaw_pid: Pid,
    mode: ControlMode,
}

impl BalanceController {
    pub fn new(params: &PhysicalParams, gains: ControllerGains) -> Self {
        let yaw_pid = Pid::new(PidGains {
            kp: gains.yaw_kp,
            ki: gains.yaw_ki,
            kd: gains.yaw_kd,
            i_limit: gains.yaw_i_limit,
        });

        Self {
            gains,
            emf_feedforward: params.back_emf_per_mps(),
            v_limit: params.battery_voltage,
            yaw_pid,
            mode: ControlMode::Upright,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_upright(&self) -> bool {
        self.mode == ControlMode::Upright
    }

    /// Compute the per-wheel voltage command for this tick.
    pub fn update(&mut self, state: &RobotState, cmd: &DriveCommand, dt: f32) -> MotorCommand {
        if self.mode == ControlMode::Upright && state.pitch.abs() > self.gains.pitch_fallen {
            warn!(
                "Pitch {:.2} rad past the fallen threshold, latching outputs to zero",
                state.pitch
            );
            self.mode = ControlMode::Fallen;
            self.yaw_pid.reset();
        }

        if self.mode == ControlMode::Fallen {
            return MotorCommand::zero();
        }

        let common = self.emf_feedforward * state.velocity
            + self.gains.ss_k1 * state.pitch_rate
            + self.gains.ss_k2 * state.pitch
            + self.gains.ss_k3 * (state.velocity - cmd.forward);

        let differential = self.yaw_pid.update(cmd.yaw_rate - state.yaw_rate, dt);

        // Positive differential steers clockwise
        MotorCommand::clamped(common + differential, common - differential, self.v_limit)
    }

    /// Manual re-arm after a fall. Clears the latch and the yaw integral.
    pub fn reset(&mut self) {
        if self.mode == ControlMode::Fallen {
            info!("Controller reset, resuming balancing");
        }
        self.mode = ControlMode::Upright;
        self.yaw_pid.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    fn controller() -> BalanceController {
        BalanceController::new(&PhysicalParams::balbot(), ControllerGains::balbot())
    }

    /// Proportional-only yaw gains, for sign checks without integral mixing
    fn p_only() -> BalanceController {
        let gains = ControllerGains {
            yaw_ki: 0.0,
            ..ControllerGains::balbot()
        };
        BalanceController::new(&PhysicalParams::balbot(), gains)
    }

    fn state(pitch: f32, pitch_rate: f32, yaw_rate: f32, velocity: f32) -> RobotState {
        RobotState {
            pitch,
            pitch_rate,
            yaw_rate,
            velocity,
        }
    }

    #[test]
    fn test_equilibrium_fixed_point() {
        let mut ctl = controller();
        let out = ctl.update(&state(0.0, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out, MotorCommand::zero());
        assert!(ctl.is_upright());
    }

    #[test]
    fn test_forward_lean_drives_wheels_forward() {
        let mut ctl = controller();
        // Leaning forward with negative gains commands negative voltage on
        // both wheels symmetrically
        let out = ctl.update(&state(0.1, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out.left, out.right);
        assert!((out.left - (-13.3f32 * 0.1).clamp(-12.0, 12.0)).abs() < 1e-4);
    }

    #[test]
    fn test_output_clamped_to_battery() {
        let mut ctl = controller();
        let out = ctl.update(&state(0.5, 8.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out.left, -12.0);
        assert_eq!(out.right, -12.0);
    }

    #[test]
    fn test_yaw_correction_opposes_rotation() {
        let mut ctl = p_only();
        // Robot spinning counter-clockwise at 0.5 rad/s, no commanded yaw:
        // the differential must steer clockwise (left forward, right back),
        // with magnitude yaw_kp * error
        let out = ctl.update(&state(0.0, 0.0, 0.5, 0.0), &DriveCommand::default(), DT);
        let expected = -0.120f32 * (0.0 - 0.5);
        assert!((out.left - expected).abs() < 1e-5);
        assert!((out.right + expected).abs() < 1e-5);
        assert!(out.left > 0.0 && out.right < 0.0);
    }

    #[test]
    fn test_velocity_command_shifts_reference() {
        let mut ctl = controller();
        let cmd = DriveCommand {
            forward: 0.2,
            yaw_rate: 0.0,
        };
        // At zero measured velocity a forward command produces K3 * (0 - 0.2)
        // on both wheels
        let out = ctl.update(&state(0.0, 0.0, 0.0, 0.0), &cmd, DT);
        assert_eq!(out.left, out.right);
        assert!((out.left - (-12.9f32 * -0.2)).abs() < 1e-4);
    }

    #[test]
    fn test_fall_latches_zero_output() {
        let mut ctl = controller();

        let out = ctl.update(&state(0.7, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out, MotorCommand::zero());
        assert_eq!(ctl.mode(), ControlMode::Fallen);

        // Even back upright, the latch holds until reset
        let out = ctl.update(&state(0.0, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out, MotorCommand::zero());
        assert_eq!(ctl.mode(), ControlMode::Fallen);

        ctl.reset();
        assert!(ctl.is_upright());
    }

    #[test]
    fn test_fall_resets_yaw_integral() {
        let mut ctl = controller();

        // Build up yaw integral while upright
        for _ in 0..50 {
            ctl.update(&state(0.0, 0.0, 0.5, 0.0), &DriveCommand::default(), DT);
        }

        // Trip the fall, then re-arm
        ctl.update(&state(0.7, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        ctl.reset();

        // With zero yaw error there must be no integral carry-over: the
        // wheels stay symmetric
        let out = ctl.update(&state(0.0, 0.0, 0.0, 0.0), &DriveCommand::default(), DT);
        assert_eq!(out.left, out.right);
    }
}
