// BalBot runtime: host-side balance control for a two-wheeled robot
//
// Talks to the drive board (wheel motors, encoders, inertial unit) over a
// serial register bus and runs the 100 Hz balance loop; commands and
// telemetry go over Zenoh.

pub mod bus;
pub mod config;
pub mod control;
pub mod estimator;
pub mod imu;
pub mod messages;
pub mod motor;
pub mod runtime;
