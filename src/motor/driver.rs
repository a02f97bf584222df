// Per-wheel drive motor subsystem
//
// One MotorDriver instance per wheel side, behind the bus trait so tests can
// inject a double. Owns the per-tick angle/velocity cache refreshed by
// `update`; getters never touch the bus.

use std::f32::consts::TAU;
use tracing::{info, warn};

use crate::bus::{BusError, ControlBus, DUTY_FULL_SCALE, Register};

/// Bus unit IDs for the wheel drivers (as configured on the board)
pub const UNIT_ID_LEFT: u8 = 1;
pub const UNIT_ID_RIGHT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelSide {
    Left,
    Right,
}

impl WheelSide {
    pub fn unit_id(self) -> u8 {
        match self {
            WheelSide::Left => UNIT_ID_LEFT,
            WheelSide::Right => UNIT_ID_RIGHT,
        }
    }
}

pub struct MotorDriver<B: ControlBus> {
    bus: B,
    side: WheelSide,
    id: u8,
    /// Shaft angle per encoder count [rad/cnt]
    rad_per_count: f32,
    /// Voltage clamp [V]
    v_limit: f32,
    angle: f32,
    velocity: f32,
    last_counts: Option<i32>,
    read_errors: u32,
    write_errors: u32,
    degraded: bool,
}

impl<B: ControlBus> MotorDriver<B> {
    pub fn new(bus: B, side: WheelSide, encoder_cpr: f32, v_limit: f32) -> Self {
        Self {
            bus,
            side,
            id: side.unit_id(),
            rad_per_count: TAU / encoder_cpr,
            v_limit,
            angle: 0.0,
            velocity: 0.0,
            last_counts: None,
            read_errors: 0,
            write_errors: 0,
            degraded: false,
        }
    }

    /// Bring up the wheel unit: ping, then enable the drive stage.
    ///
    /// Failure here means the hardware is absent or broken and aborts
    /// startup; it is not recovered.
    pub fn init(&mut self) -> Result<(), BusError> {
        match self.bus.ping(self.id) {
            Ok(true) => {}
            Ok(false) => {
                warn!("{:?} wheel unit {} not responding to ping", self.side, self.id);
                return Err(BusError::Timeout { id: self.id });
            }
            Err(e) => return Err(e),
        }

        self.bus.write_u8(self.id, Register::DriveEnable, 1)?;
        info!("{:?} wheel unit {} initialized", self.side, self.id);
        Ok(())
    }

    /// Refresh the cached shaft angle and velocity from the encoder.
    ///
    /// Must be called once per tick before the getters are trusted. A failed
    /// read holds the last-known-good values for this tick and increments
    /// the error counter; there is no retry.
    pub fn update(&mut self, dt: f32) {
        let counts = match self.bus.read_i32(self.id, Register::EncoderCount) {
            Ok(counts) => counts,
            Err(e) => {
                self.read_errors += 1;
                if !self.degraded {
                    warn!("{:?} wheel encoder read failed, holding last value: {}", self.side, e);
                    self.degraded = true;
                }
                return;
            }
        };
        self.degraded = false;

        let angle = counts as f32 * self.rad_per_count;
        if let Some(last) = self.last_counts {
            if dt > 0.0 {
                let last_angle = last as f32 * self.rad_per_count;
                self.velocity = (angle - last_angle) / dt;
            }
        }
        self.angle = angle;
        self.last_counts = Some(counts);
    }

    /// Command the output voltage, clamped to the battery limit.
    ///
    /// A failed write is counted and the command retried implicitly by the
    /// next tick's command; the loop is never aborted for it.
    pub fn set_voltage(&mut self, v_cmd: f32) {
        let v = v_cmd.clamp(-self.v_limit, self.v_limit);
        let raw = (v / self.v_limit * DUTY_FULL_SCALE as f32).round() as i16;

        if let Err(e) = self.bus.write_i16(self.id, Register::DutyCommand, raw) {
            self.write_errors += 1;
            warn!("{:?} wheel duty write failed: {}", self.side, e);
        }
    }

    /// Most recent shaft angle [rad]; cached by `update`
    pub fn get_angle(&self) -> f32 {
        self.angle
    }

    /// Most recent shaft angular velocity [rad/s]; cached by `update`
    pub fn get_velocity(&self) -> f32 {
        self.velocity
    }

    pub fn side(&self) -> WheelSide {
        self.side
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }
}

impl<B: ControlBus> Drop for MotorDriver<B> {
    fn drop(&mut self) {
        // Leave the wheel unpowered when the driver goes away
        if let Err(e) = self.bus.write_i16(self.id, Register::DutyCommand, 0) {
            warn!("Failed to zero {:?} wheel on drop: {}", self.side, e);
        }
        let _ = self.bus.write_u8(self.id, Register::DriveEnable, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared record of everything a driver did to the bus
    #[derive(Default)]
    struct BusLog {
        counts: i32,
        fail_reads: bool,
        present: bool,
        enables: Vec<u8>,
        duties: Vec<i16>,
    }

    #[derive(Clone)]
    struct MockBus(Rc<RefCell<BusLog>>);

    impl MockBus {
        fn new(present: bool) -> Self {
            Self(Rc::new(RefCell::new(BusLog {
                present,
                ..Default::default()
            })))
        }
    }

    impl ControlBus for MockBus {
        fn ping(&mut self, _id: u8) -> Result<bool> {
            Ok(self.0.borrow().present)
        }

        fn write_u8(&mut self, _id: u8, _register: Register, value: u8) -> Result<()> {
            self.0.borrow_mut().enables.push(value);
            Ok(())
        }

        fn write_i16(&mut self, _id: u8, _register: Register, value: i16) -> Result<()> {
            self.0.borrow_mut().duties.push(value);
            Ok(())
        }

        fn read_block(&mut self, id: u8, _register: Register, buf: &mut [u8]) -> Result<()> {
            let log = self.0.borrow();
            if log.fail_reads {
                return Err(BusError::Timeout { id });
            }
            buf.copy_from_slice(&log.counts.to_le_bytes());
            Ok(())
        }
    }

    const CPR: f32 = 1320.0;
    const VB: f32 = 12.0;

    fn driver(bus: &MockBus) -> MotorDriver<MockBus> {
        MotorDriver::new(bus.clone(), WheelSide::Left, CPR, VB)
    }

    #[test]
    fn test_init_enables_drive() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);
        m.init().unwrap();
        assert_eq!(bus.0.borrow().enables, vec![1]);
    }

    #[test]
    fn test_init_fails_when_unit_absent() {
        let bus = MockBus::new(false);
        let mut m = driver(&bus);
        assert!(matches!(m.init(), Err(BusError::Timeout { .. })));
    }

    #[test]
    fn test_angle_follows_encoder_cpr() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);

        bus.0.borrow_mut().counts = CPR as i32; // exactly one revolution
        m.update(0.01);
        assert!((m.get_angle() - TAU).abs() < 1e-4);

        bus.0.borrow_mut().counts = -(CPR as i32) / 2;
        m.update(0.01);
        assert!((m.get_angle() + TAU / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_velocity_consistent_with_angle_derivative() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);
        let dt = 0.01;

        m.update(dt); // first update seeds the count, velocity stays 0
        assert_eq!(m.get_velocity(), 0.0);

        bus.0.borrow_mut().counts = 132; // 0.1 revolution
        m.update(dt);
        let expected = 0.1 * TAU / dt;
        assert!((m.get_velocity() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_getters_idempotent_between_updates() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);

        bus.0.borrow_mut().counts = 500;
        m.update(0.01);
        let angle = m.get_angle();
        let velocity = m.get_velocity();

        // Encoder moves, but without an update the cache must not
        bus.0.borrow_mut().counts = 900;
        assert_eq!(m.get_angle(), angle);
        assert_eq!(m.get_velocity(), velocity);
        assert_eq!(m.get_angle(), angle);
    }

    #[test]
    fn test_set_voltage_clamps_to_battery() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);

        m.set_voltage(100.0);
        m.set_voltage(-100.0);
        m.set_voltage(6.0);
        m.set_voltage(-3.0);

        let duties = bus.0.borrow().duties.clone();
        assert_eq!(duties, vec![1000, -1000, 500, -250]);
    }

    #[test]
    fn test_failed_read_holds_last_value() {
        let bus = MockBus::new(true);
        let mut m = driver(&bus);

        bus.0.borrow_mut().counts = 660; // half revolution
        m.update(0.01);
        let angle = m.get_angle();

        bus.0.borrow_mut().fail_reads = true;
        m.update(0.01);
        assert_eq!(m.get_angle(), angle);
        assert_eq!(m.read_errors(), 1);

        m.update(0.01);
        assert_eq!(m.read_errors(), 2);

        // Recovery resumes tracking
        bus.0.borrow_mut().fail_reads = false;
        bus.0.borrow_mut().counts = 1320;
        m.update(0.01);
        assert!((m.get_angle() - TAU).abs() < 1e-4);
    }
}
