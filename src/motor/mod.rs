// Actuator interface for drivebase motors
//
// Provides:
// - The `Actuator` trait the drivebase drives its two wheels through
// - A simulated motor for tests and hardware-free runs
// - Feetech STS3215 serial protocol and a motor backed by it

mod driver;
pub mod feetech;
pub mod sim;

use serde::{Deserialize, Serialize};

use crate::control::ControlSettings;
use crate::error::{DriveError, Result};
use crate::fix16::Fix16;

pub use driver::FeetechMotor;
pub use feetech::{FeetechBus, FeetechError};
pub use sim::SimMotor;

/// Which way the output turns for positive duty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Clockwise,
    Counterclockwise,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Clockwise => 1,
            Direction::Counterclockwise => -1,
        }
    }
}

/// A motor with an encoder.
///
/// Counts and rates are in encoder counts, duty in ±`MAX_DUTY`. While an
/// actuator is claimed by a drivebase, standalone commands are rejected.
pub trait Actuator {
    /// Tuning of this motor on its own
    fn settings(&self) -> &ControlSettings;

    /// Gearing: encoder counts per degree at the output
    fn counts_per_unit(&self) -> Fix16 {
        self.settings().counts_per_unit
    }

    fn count(&mut self) -> Result<i32>;

    fn rate(&mut self) -> Result<i32>;

    fn set_duty_cycle(&mut self, duty: i32) -> Result<()>;

    fn coast(&mut self) -> Result<()>;

    fn brake(&mut self) -> Result<()>;

    /// Make the motor passive no matter what it was doing
    fn stop_force(&mut self) -> Result<()>;

    /// Abandon any standalone command in progress
    fn stop_control(&mut self);

    fn set_claimed(&mut self, claimed: bool);

    fn is_claimed(&self) -> bool;

    /// Standalone duty command, refused while claimed
    fn run_duty(&mut self, duty: i32) -> Result<()> {
        if self.is_claimed() {
            return Err(DriveError::InvalidOperation("motor is claimed by a drivebase"));
        }
        self.set_duty_cycle(duty)
    }
}
