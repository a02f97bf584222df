// Inertial unit reader
//
// The inertial unit shares the drive board bus. One block read per tick
// fetches both gyro rates and the accelerometer pair; the accelerometer tilt
// comes from the ratio of the two axes, so the raw scale cancels.

use std::f32::consts::PI;
use tracing::{info, warn};

use crate::bus::{BusError, ControlBus, Register};

/// Bus unit ID of the inertial unit
pub const UNIT_ID_IMU: u8 = 3;

/// Gyro scale: +/-500 deg/s full range over a signed 16-bit register
const GYRO_RAD_PER_LSB: f32 = (500.0 / 32768.0) * (PI / 180.0);

/// One inertial sample, in the robot body frame.
///
/// Positive pitch leans the robot forward; positive yaw turns it
/// counter-clockwise seen from above.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuSample {
    /// Pitch rate from the gyro [rad/s]
    pub pitch_rate: f32,
    /// Yaw rate from the gyro [rad/s]
    pub yaw_rate: f32,
    /// Forward tilt measured from the accelerometer [rad]
    pub tilt: f32,
}

pub struct Imu<B: ControlBus> {
    bus: B,
    id: u8,
    last: ImuSample,
    read_errors: u32,
    degraded: bool,
}

impl<B: ControlBus> Imu<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            id: UNIT_ID_IMU,
            last: ImuSample::default(),
            read_errors: 0,
            degraded: false,
        }
    }

    /// Check the unit is present. Failure aborts startup.
    pub fn init(&mut self) -> Result<(), BusError> {
        match self.bus.ping(self.id) {
            Ok(true) => {
                info!("Inertial unit {} initialized", self.id);
                Ok(())
            }
            Ok(false) => {
                warn!("Inertial unit {} not responding to ping", self.id);
                Err(BusError::Timeout { id: self.id })
            }
            Err(e) => Err(e),
        }
    }

    /// Read the current sample; a failed read returns the previous one and
    /// increments the error counter.
    pub fn sample(&mut self) -> ImuSample {
        let mut buf = [0u8; 8];
        match self.bus.read_block(self.id, Register::GyroPitch, &mut buf) {
            Ok(()) => {
                self.degraded = false;
                let gyro_pitch = i16::from_le_bytes([buf[0], buf[1]]);
                let gyro_yaw = i16::from_le_bytes([buf[2], buf[3]]);
                let accel_forward = i16::from_le_bytes([buf[4], buf[5]]);
                let accel_vertical = i16::from_le_bytes([buf[6], buf[7]]);

                self.last = ImuSample {
                    pitch_rate: gyro_pitch as f32 * GYRO_RAD_PER_LSB,
                    yaw_rate: gyro_yaw as f32 * GYRO_RAD_PER_LSB,
                    tilt: (accel_forward as f32).atan2(accel_vertical as f32),
                };
                self.last
            }
            Err(e) => {
                self.read_errors += 1;
                if !self.degraded {
                    warn!("Inertial read failed, holding last sample: {}", e);
                    self.degraded = true;
                }
                self.last
            }
        }
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }
}
