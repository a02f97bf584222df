// Wheel motor subsystem
//
// One driver instance per wheel side, both talking to the drive board over
// the shared register bus.

mod driver;

pub use driver::{MotorDriver, UNIT_ID_LEFT, UNIT_ID_RIGHT, WheelSide};
