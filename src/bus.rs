// Serial register protocol for the BalBot drive board
//
// The board carries the two wheel drivers (H-bridge + quadrature decoder per
// wheel) and the inertial unit, addressed as units on a half-duplex register
// bus. Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Response timeout for a single transaction
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Duty full scale: a duty command of +/-1000 applies the full battery
/// voltage in the corresponding direction.
pub const DUTY_FULL_SCALE: i16 = 1000;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses, shared by all units on the board
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 3, // 2 bytes, read-only
    Id = 5,          // 1 byte

    // RAM area (volatile)
    DriveEnable = 24,   // 1 byte: 0=coast, 1=driven (wheel units)
    DutyCommand = 26,   // 2 bytes, sign-magnitude, full scale = battery voltage
    EncoderCount = 30,  // 4 bytes, signed, little-endian, read-only
    GyroPitch = 38,     // 2 bytes, signed raw rate (inertial unit)
    GyroYaw = 40,       // 2 bytes, signed raw rate
    AccelForward = 42,  // 2 bytes, signed raw acceleration
    AccelVertical = 44, // 2 bytes, signed raw acceleration
}

/// Error types for board communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from unit {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for unit {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Unit {id} returned error status: 0x{status:02X}")]
    UnitError { id: u8, status: u8 },

    #[error("Timeout waiting for response from unit {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Bus operations the drivers and the inertial reader need.
///
/// The serial implementation talks to the real board; tests substitute an
/// in-memory double behind the same trait.
pub trait ControlBus {
    /// Check whether a unit is present on the bus
    fn ping(&mut self, id: u8) -> Result<bool>;

    /// Write a single byte to a register
    fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()>;

    /// Write a signed 16-bit value (sign-magnitude on the wire)
    fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()>;

    /// Read `buf.len()` consecutive register bytes starting at `register`
    fn read_block(&mut self, id: u8, register: Register, buf: &mut [u8]) -> Result<()>;

    /// Read a signed 32-bit little-endian value
    fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_block(id, register, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}

/// Serial implementation of the board protocol.
pub struct SerialBus {
    port: Box<dyn SerialPort>,
}

impl SerialBus {
    /// Open a connection to the board
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Clone the underlying port handle.
    ///
    /// Each wheel driver owns its own handle to the one physical port. The
    /// control loop is strictly sequential, so transactions never interleave.
    pub fn try_clone(&self) -> Result<Self> {
        let port = self.port.try_clone()?;
        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + params + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..];
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read and validate a response packet, returning its parameter bytes
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Remaining bytes: error status + params + checksum
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(BusError::ChecksumMismatch { id });
        }

        let error_status = remaining[0];
        if error_status != 0 {
            return Err(BusError::UnitError {
                id,
                status: error_status,
            });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }
}

impl ControlBus for SerialBus {
    fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write u8 to unit {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let raw = encode_sign_magnitude(value);
        let params = [register as u8, (raw & 0xFF) as u8, (raw >> 8) as u8];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write i16 to unit {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    fn read_block(&mut self, id: u8, register: Register, buf: &mut [u8]) -> Result<()> {
        let params = [register as u8, buf.len() as u8]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() != buf.len() {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", buf.len(), response.len()),
            });
        }
        buf.copy_from_slice(&response);
        Ok(())
    }
}

/// Encode a signed value to sign-magnitude format
/// Bit 15 = sign (1 = negative), Bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32) as u16)
    }
}

/// Decode sign-magnitude format to signed value
pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}
