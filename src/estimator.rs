// State estimation for the balance loop
//
// Fuses the inertial sample with the wheel encoders into the per-tick state
// snapshot the controller consumes. Pitch comes from a complementary filter:
// the gyro integral tracks fast motion, the accelerometer tilt pins the low
// frequencies. Yaw rate reconciles the gyro with the wheel differential, and
// forward velocity is the mean wheel speed scaled by the wheel radius.

use crate::config::PhysicalParams;
use crate::imu::ImuSample;

/// Complementary filter time constant for pitch [s]
const PITCH_FILTER_TAU: f32 = 0.5;

/// Gyro weight when blending gyro yaw against the wheel-differential yaw
const YAW_GYRO_BLEND: f32 = 0.7;

/// Per-tick state snapshot.
///
/// Produced fresh by the estimator each tick; consumed read-only by the
/// controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RobotState {
    /// Forward tilt from vertical [rad]
    pub pitch: f32,
    /// Pitch rate [rad/s]
    pub pitch_rate: f32,
    /// Turn rate, positive counter-clockwise [rad/s]
    pub yaw_rate: f32,
    /// Forward velocity [m/s]
    pub velocity: f32,
}

pub struct StateEstimator {
    /// Rw / dB: wheel differential [rad/s] to yaw rate [rad/s]
    yaw_scale: f32,
    /// Rw / 2: mean wheel speed [rad/s] to forward velocity [m/s]
    half_wheel_radius: f32,
    pitch: f32,
    seeded: bool,
}

impl StateEstimator {
    pub fn new(params: &PhysicalParams) -> Self {
        Self {
            yaw_scale: params.wheel_radius * params.wheel_base_inv(),
            half_wheel_radius: params.half_wheel_radius(),
            pitch: 0.0,
            seeded: false,
        }
    }

    /// Produce the state estimate for this tick.
    ///
    /// `left_wheel` / `right_wheel` are shaft angular velocities [rad/s] from
    /// the motor drivers, refreshed earlier in the same tick. The first call
    /// seeds the pitch filter from the accelerometer tilt.
    pub fn update(
        &mut self,
        imu: &ImuSample,
        left_wheel: f32,
        right_wheel: f32,
        dt: f32,
    ) -> RobotState {
        if self.seeded {
            let alpha = PITCH_FILTER_TAU / (PITCH_FILTER_TAU + dt);
            self.pitch = alpha * (self.pitch + imu.pitch_rate * dt) + (1.0 - alpha) * imu.tilt;
        } else {
            self.pitch = imu.tilt;
            self.seeded = true;
        }

        // Right wheel faster than left turns the robot counter-clockwise
        let yaw_wheel = (right_wheel - left_wheel) * self.yaw_scale;
        let yaw_rate = YAW_GYRO_BLEND * imu.yaw_rate + (1.0 - YAW_GYRO_BLEND) * yaw_wheel;

        let velocity = (left_wheel + right_wheel) * self.half_wheel_radius;

        RobotState {
            pitch: self.pitch,
            pitch_rate: imu.pitch_rate,
            yaw_rate,
            velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    fn estimator() -> StateEstimator {
        StateEstimator::new(&PhysicalParams::balbot())
    }

    fn sample(pitch_rate: f32, yaw_rate: f32, tilt: f32) -> ImuSample {
        ImuSample {
            pitch_rate,
            yaw_rate,
            tilt,
        }
    }

    #[test]
    fn test_first_update_seeds_pitch_from_tilt() {
        let mut est = estimator();
        let state = est.update(&sample(0.0, 0.0, 0.2), 0.0, 0.0, DT);
        assert_eq!(state.pitch, 0.2);
    }

    #[test]
    fn test_pitch_converges_to_steady_tilt() {
        let mut est = estimator();
        est.update(&sample(0.0, 0.0, 0.0), 0.0, 0.0, DT);

        // Robot leaned to a steady 0.1 rad, gyro quiet: the accelerometer
        // term must pull the estimate over within a few time constants.
        let mut state = RobotState::default();
        for _ in 0..300 {
            state = est.update(&sample(0.0, 0.0, 0.1), 0.0, 0.0, DT);
        }
        assert!((state.pitch - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_gyro_drives_short_term_pitch() {
        let mut est = estimator();
        est.update(&sample(0.0, 0.0, 0.0), 0.0, 0.0, DT);

        let state = est.update(&sample(1.0, 0.0, 0.0), 0.0, 0.0, DT);
        let alpha = PITCH_FILTER_TAU / (PITCH_FILTER_TAU + DT);
        assert!((state.pitch - alpha * DT).abs() < 1e-6);
        assert_eq!(state.pitch_rate, 1.0);
    }

    #[test]
    fn test_forward_velocity_from_mean_wheel_speed() {
        let params = PhysicalParams::balbot();
        let mut est = estimator();
        let state = est.update(&sample(0.0, 0.0, 0.0), 10.0, 10.0, DT);
        assert!((state.velocity - 10.0 * params.wheel_radius).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_rate_blend() {
        let params = PhysicalParams::balbot();
        let mut est = estimator();

        // Wheel differential alone: right faster means counter-clockwise
        let diff = 2.0 * params.wheel_radius / params.wheel_base;
        let state = est.update(&sample(0.0, 0.0, 0.0), -1.0, 1.0, DT);
        assert!((state.yaw_rate - (1.0 - YAW_GYRO_BLEND) * diff).abs() < 1e-5);

        // Gyro and wheels agreeing pass straight through
        let state = est.update(&sample(0.0, diff, 0.0), -1.0, 1.0, DT);
        assert!((state.yaw_rate - diff).abs() < 1e-5);
    }
}
