// Feetech STS3215 serial protocol, as used for open-loop drive motors
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// The drive motors run in PWM mode; position and speed are read back from the
// servo's own encoder.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Encoder steps per output revolution
pub const STEPS_PER_REVOLUTION: i32 = 4096;

/// Largest PWM magnitude the servo accepts
pub const MAX_PWM: i16 = 1000;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33, // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,  // 1 byte
    GoalPwm = 44,       // 2 bytes, sign in bit 10 (PWM mode)
    Lock = 55,          // 1 byte
    PresentPosition = 56, // 2 bytes, 0..4095
    PresentVelocity = 58, // 2 bytes, sign in bit 15
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Position and speed read in one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoFeedback {
    /// Single-turn position, 0..4095
    pub position: u16,
    /// Steps per second
    pub velocity: i16,
}

pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_response(id)
    }

    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // Status byte, params, checksum
        let mut body = vec![0u8; length as usize];
        self.port.read_exact(&mut body)?;

        let (payload, received) = body.split_at(body.len() - 1);
        let mut checked = vec![id, length];
        checked.extend_from_slice(payload);
        if Self::checksum(&checked) != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::MotorError {
                id,
                status: payload[0],
            });
        }

        Ok(payload[1..].to_vec())
    }

    /// `Ok(false)` when nothing answers
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])?;
        Ok(())
    }

    fn read_bytes(&mut self, id: u8, register: Register, len: u8) -> Result<Vec<u8>> {
        let response = self.transact(id, Instruction::Read, &[register as u8, len])?;
        if response.len() < len as usize {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", len, response.len()),
            });
        }
        Ok(response)
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        Ok(self.read_bytes(id, register, 1)?[0])
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let bytes = self.read_bytes(id, register, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    /// Torque off: the output spins freely
    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Must be called with torque disabled
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Open-loop drive, `pwm` in ±`MAX_PWM`
    pub fn set_pwm(&mut self, id: u8, pwm: i16) -> Result<()> {
        self.write_u16(id, Register::GoalPwm, encode_pwm(pwm))
    }

    /// Present position and velocity, read together
    pub fn read_feedback(&mut self, id: u8) -> Result<ServoFeedback> {
        let bytes = self.read_bytes(id, Register::PresentPosition, 4)?;
        let position = u16::from_le_bytes([bytes[0], bytes[1]]) & 0x0FFF;
        let velocity = decode_sign_magnitude(u16::from_le_bytes([bytes[2], bytes[3]]), 15);
        Ok(ServoFeedback { position, velocity })
    }
}

/// PWM goal: bit 10 carries the sign, bits 0-9 the magnitude
fn encode_pwm(pwm: i16) -> u16 {
    let magnitude = pwm.unsigned_abs().min(MAX_PWM as u16);
    if pwm < 0 {
        magnitude | 0x0400
    } else {
        magnitude
    }
}

/// Sign-magnitude value with the sign in `sign_bit`
fn decode_sign_magnitude(raw: u16, sign_bit: u8) -> i16 {
    let sign = 1u16 << sign_bit;
    let magnitude = (raw & (sign - 1)) as i16;
    if raw & sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Signed step difference between two single-turn readings, taking the
/// shorter way around
pub fn wrapped_delta(previous: u16, current: u16) -> i32 {
    let half = STEPS_PER_REVOLUTION / 2;
    let delta = current as i32 - previous as i32;
    (delta + half).rem_euclid(STEPS_PER_REVOLUTION) - half
}
