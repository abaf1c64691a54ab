// Simulated DC motor with encoder
//
// The output rate follows duty instantly (full duty = `max_rate` counts/s).
// Coasting decays the rate, braking stops it. Time only advances through
// `step`, which keeps runs deterministic.

use tracing::debug;

use super::{Actuator, Direction};
use crate::control::{ControlSettings, MAX_DUTY};
use crate::error::{DriveError, Result};

/// Rate time constant while coasting, µs
const COAST_TAU_US: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Coast,
    Brake,
    Duty(i32),
}

#[derive(Debug, Clone)]
pub struct SimMotor {
    settings: ControlSettings,
    direction: Direction,
    max_rate: f64,
    position: f64,
    rate: f64,
    mode: Mode,
    claimed: bool,
    standalone: bool,
    connected: bool,
    blocked: bool,
}

impl SimMotor {
    pub fn new(settings: ControlSettings, direction: Direction, max_rate: i32) -> Self {
        Self {
            settings,
            direction,
            max_rate: max_rate as f64,
            position: 0.0,
            rate: 0.0,
            mode: Mode::Coast,
            claimed: false,
            standalone: false,
            connected: true,
            blocked: false,
        }
    }

    /// Advance the simulation by `dt_us`
    pub fn step(&mut self, dt_us: u32) {
        let dt = dt_us as f64;
        self.rate = match self.mode {
            _ if self.blocked => 0.0,
            Mode::Duty(duty) => duty as f64 * self.max_rate / MAX_DUTY as f64,
            Mode::Brake => 0.0,
            Mode::Coast => self.rate * (-dt / COAST_TAU_US).exp(),
        };
        self.position += self.rate * dt / 1e6;
    }

    /// Simulate unplugging (`false`) or reconnecting the motor
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Hold the output shaft still regardless of duty
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub fn is_coasting(&self) -> bool {
        self.mode == Mode::Coast
    }

    pub fn is_braking(&self) -> bool {
        self.mode == Mode::Brake
    }

    /// Last applied duty in the motor's own direction convention
    pub fn duty(&self) -> Option<i32> {
        match self.mode {
            Mode::Duty(duty) => Some(duty * self.direction.sign()),
            _ => None,
        }
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DriveError::NoDevice)
        }
    }
}

impl Actuator for SimMotor {
    fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    fn count(&mut self) -> Result<i32> {
        self.check_connected()?;
        Ok(self.position as i32 * self.direction.sign())
    }

    fn rate(&mut self) -> Result<i32> {
        self.check_connected()?;
        Ok(self.rate as i32 * self.direction.sign())
    }

    fn set_duty_cycle(&mut self, duty: i32) -> Result<()> {
        self.check_connected()?;
        let duty = duty.clamp(-MAX_DUTY, MAX_DUTY) * self.direction.sign();
        self.mode = Mode::Duty(duty);
        Ok(())
    }

    fn coast(&mut self) -> Result<()> {
        self.check_connected()?;
        self.mode = Mode::Coast;
        Ok(())
    }

    fn brake(&mut self) -> Result<()> {
        self.check_connected()?;
        self.mode = Mode::Brake;
        Ok(())
    }

    fn stop_force(&mut self) -> Result<()> {
        self.standalone = false;
        self.check_connected()?;
        self.mode = Mode::Coast;
        Ok(())
    }

    fn stop_control(&mut self) {
        if self.standalone {
            debug!("Abandoning standalone duty command");
            self.standalone = false;
            self.mode = Mode::Coast;
        }
    }

    fn set_claimed(&mut self, claimed: bool) {
        self.claimed = claimed;
    }

    fn is_claimed(&self) -> bool {
        self.claimed
    }

    fn run_duty(&mut self, duty: i32) -> Result<()> {
        if self.claimed {
            return Err(DriveError::InvalidOperation("motor is claimed by a drivebase"));
        }
        self.set_duty_cycle(duty)?;
        self.standalone = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor(direction: Direction) -> SimMotor {
        SimMotor::new(ControlSettings::default(), direction, 1_000)
    }

    #[test]
    fn test_duty_drives_rate() {
        let mut m = motor(Direction::Clockwise);
        m.set_duty_cycle(5_000).unwrap();
        m.step(100_000);
        assert_eq!(m.rate().unwrap(), 500);
        assert_eq!(m.count().unwrap(), 50);
    }

    #[test]
    fn test_direction_mirrors_counts() {
        let mut m = motor(Direction::Counterclockwise);
        m.set_duty_cycle(5_000).unwrap();
        m.step(100_000);
        assert_eq!(m.rate().unwrap(), 500);
        assert_eq!(m.count().unwrap(), 50);
        assert_eq!(m.duty(), Some(5_000));
    }

    #[test]
    fn test_brake_and_coast() {
        let mut m = motor(Direction::Clockwise);
        m.set_duty_cycle(MAX_DUTY).unwrap();
        m.step(10_000);
        m.coast().unwrap();
        m.step(10_000);
        let coasting = m.rate().unwrap();
        assert!(coasting > 0 && coasting < 1_000);
        m.brake().unwrap();
        m.step(10_000);
        assert_eq!(m.rate().unwrap(), 0);
    }

    #[test]
    fn test_disconnected_reports_no_device() {
        let mut m = motor(Direction::Clockwise);
        m.set_connected(false);
        assert!(matches!(m.count(), Err(DriveError::NoDevice)));
        assert!(matches!(m.stop_force(), Err(DriveError::NoDevice)));
    }

    #[test]
    fn test_claimed_motor_rejects_standalone_duty() {
        let mut m = motor(Direction::Clockwise);
        m.set_claimed(true);
        assert!(matches!(
            m.run_duty(1_000),
            Err(DriveError::InvalidOperation(_))
        ));
        m.set_claimed(false);
        m.run_duty(1_000).unwrap();
        m.stop_control();
        assert!(m.is_coasting());
    }
}
