// Drive motor backed by a Feetech STS3215 servo in PWM mode
//
// Several motors share one serial bus. The servo reports a single-turn
// position, which is unwrapped here into a continuous count.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, OperatingMode, ServoFeedback, STEPS_PER_REVOLUTION, wrapped_delta};
use super::{Actuator, Direction};
use crate::control::{ControlSettings, MAX_DUTY};
use crate::error::{DriveError, Result};
use crate::fix16::Fix16;

/// Tuning for an STS3215 turning a drive wheel, in encoder steps
pub fn sts3215_settings() -> ControlSettings {
    ControlSettings {
        counts_per_unit: Fix16::from_ratio(STEPS_PER_REVOLUTION, 360),
        max_rate: 2_800,
        abs_acceleration: 8_000,
        rate_tolerance: 100,
        count_tolerance: 20,
        stall_rate_limit: 40,
        stall_time: 200_000,
        pid_kp: 30,
        pid_ki: 20,
        pid_kd: 0,
        integral_range: 200,
        integral_rate: 30,
        max_control: MAX_DUTY,
        control_offset: 0,
        actuation_scale: MAX_DUTY / 1_000,
    }
}

pub struct FeetechMotor {
    bus: Arc<Mutex<FeetechBus>>,
    id: u8,
    direction: Direction,
    settings: ControlSettings,
    last_position: Option<u16>,
    count: i32,
    claimed: bool,
    standalone: bool,
}

impl FeetechMotor {
    /// Connect to servo `id` and switch it to PWM mode, torque on
    pub fn new(bus: Arc<Mutex<FeetechBus>>, id: u8, direction: Direction) -> Result<Self> {
        let mut motor = Self {
            bus,
            id,
            direction,
            settings: sts3215_settings(),
            last_position: None,
            count: 0,
            claimed: false,
            standalone: false,
        };
        motor.initialize()?;
        Ok(motor)
    }

    fn initialize(&mut self) -> Result<()> {
        let id = self.id;
        let mut bus = self.lock_bus()?;
        if !bus.ping(id)? {
            warn!("Motor {} not responding to ping", id);
            return Err(DriveError::NoDevice);
        }

        // Operating mode may only change with torque off
        bus.disable_torque(id)?;
        bus.set_operating_mode(id, OperatingMode::Pwm)?;
        bus.enable_torque(id)?;
        bus.set_pwm(id, 0)?;
        drop(bus);

        info!("Motor {} initialized for PWM drive", id);
        self.read_feedback()?;
        Ok(())
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    fn lock_bus(&self) -> Result<MutexGuard<'_, FeetechBus>> {
        self.bus
            .lock()
            .map_err(|_| DriveError::InvalidOperation("motor bus lock poisoned"))
    }

    fn read_feedback(&mut self) -> Result<ServoFeedback> {
        let feedback = self.lock_bus()?.read_feedback(self.id)?;
        if let Some(previous) = self.last_position {
            self.count = self
                .count
                .wrapping_add(wrapped_delta(previous, feedback.position));
        }
        self.last_position = Some(feedback.position);
        Ok(feedback)
    }

    fn write_pwm(&mut self, duty: i32) -> Result<()> {
        let duty = duty.clamp(-MAX_DUTY, MAX_DUTY) * self.direction.sign();
        let pwm = (duty / self.settings.actuation_scale.max(1)) as i16;
        self.lock_bus()?.set_pwm(self.id, pwm)?;
        Ok(())
    }
}

impl Actuator for FeetechMotor {
    fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    fn count(&mut self) -> Result<i32> {
        self.read_feedback()?;
        Ok(self.count * self.direction.sign())
    }

    fn rate(&mut self) -> Result<i32> {
        let feedback = self.read_feedback()?;
        Ok(feedback.velocity as i32 * self.direction.sign())
    }

    fn set_duty_cycle(&mut self, duty: i32) -> Result<()> {
        let id = self.id;
        self.lock_bus()?.enable_torque(id)?;
        self.write_pwm(duty)
    }

    fn coast(&mut self) -> Result<()> {
        let id = self.id;
        self.lock_bus()?.disable_torque(id)?;
        Ok(())
    }

    fn brake(&mut self) -> Result<()> {
        let id = self.id;
        self.lock_bus()?.enable_torque(id)?;
        self.write_pwm(0)
    }

    fn stop_force(&mut self) -> Result<()> {
        self.standalone = false;
        self.coast()
    }

    fn stop_control(&mut self) {
        if self.standalone {
            debug!("Motor {}: abandoning standalone duty command", self.id);
            self.standalone = false;
            if let Err(e) = self.coast() {
                warn!("Motor {}: failed to coast: {}", self.id, e);
            }
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

impl Drop for FeetechMotor {
    fn drop(&mut self) {
        if let Err(e) = self.coast() {
            warn!("Failed to release motor {} on drop: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sts3215_gearing() {
        let settings = sts3215_settings();
        assert_eq!(settings.user_to_counts(360), 4095);
        assert_eq!(settings.actuation_scale, 10);
    }
}
