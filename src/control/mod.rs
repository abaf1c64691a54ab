// Motion controller for one axis: trajectory tracking with PID feedback
//
// Provides:
// - Speed and position integrators with windup prevention
// - Reference trajectories for angle and timed maneuvers
// - Unit scaling between user units and encoder counts

pub mod integrator;
pub mod settings;
pub mod trajectory;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DriveError, Result};

pub use integrator::{PositionIntegrator, SpeedIntegrator};
pub use settings::{ControlSettings, MAX_DUTY};
pub use trajectory::{Reference, Trajectory};

/// Endless cruises are rebased after this long, µs
const REBASE_AGE_US: u32 = 1 << 30;

/// What the motors should do with the control signal
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuation {
    Coast = 0,
    Brake = 1,
    Hold = 2,
    Duty = 3,
}

impl TryFrom<u8> for Actuation {
    type Error = DriveError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Actuation::Coast),
            1 => Ok(Actuation::Brake),
            2 => Ok(Actuation::Hold),
            3 => Ok(Actuation::Duty),
            _ => Err(DriveError::InvalidArgument("unknown actuation")),
        }
    }
}

impl FromStr for Actuation {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coast" => Ok(Actuation::Coast),
            "brake" => Ok(Actuation::Brake),
            "hold" => Ok(Actuation::Hold),
            "duty" => Ok(Actuation::Duty),
            _ => Err(DriveError::InvalidArgument("unknown actuation")),
        }
    }
}

impl fmt::Display for Actuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Actuation::Coast => "coast",
            Actuation::Brake => "brake",
            Actuation::Hold => "hold",
            Actuation::Duty => "duty",
        };
        f.write_str(name)
    }
}

/// When a maneuver counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTarget {
    /// Continuous mode, only an explicit stop ends it
    Never,
    /// Trajectory finished and position and rate within tolerance
    Angle,
    /// Trajectory finished
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    None,
    Angle,
    Timed,
}

#[derive(Debug, Clone)]
pub struct Control {
    settings: ControlSettings,
    kind: ControlKind,
    trajectory: Trajectory,
    after_stop: Actuation,
    on_target: OnTarget,
    speed_integrator: SpeedIntegrator,
    position_integrator: PositionIntegrator,
    last_count: i32,
    is_on_target: bool,
    stalled: bool,
}

impl Control {
    pub fn new(settings: ControlSettings) -> Self {
        Self {
            settings,
            kind: ControlKind::None,
            trajectory: Trajectory::default(),
            after_stop: Actuation::Coast,
            on_target: OnTarget::Never,
            speed_integrator: SpeedIntegrator::new(),
            position_integrator: PositionIntegrator::new(),
            last_count: 0,
            is_on_target: false,
            stalled: false,
        }
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ControlSettings {
        &mut self.settings
    }

    pub fn is_active(&self) -> bool {
        self.kind != ControlKind::None
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn is_on_target(&self) -> bool {
        self.is_on_target
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn user_to_counts(&self, user: i32) -> i32 {
        self.settings.user_to_counts(user)
    }

    pub fn counts_to_user(&self, counts: i32) -> i32 {
        self.settings.counts_to_user(counts)
    }

    /// Keep a motionless angle maneuver going until `other` finishes, so
    /// both report their terminal actuation in the same cycle
    pub fn align_completion(&mut self, other: &Control) {
        if self.kind != ControlKind::Angle {
            return;
        }
        if let Some(duration) = other.trajectory.duration() {
            self.trajectory.hold_for(duration);
        }
    }

    pub fn stop(&mut self) {
        self.kind = ControlKind::None;
        self.is_on_target = false;
        self.stalled = false;
    }

    /// Move by `relative_target` counts and finish with `after_stop`.
    ///
    /// If an angle maneuver is already running, the new target is relative to
    /// its target rather than to the measured count, so repeated holds do not
    /// drift.
    #[allow(clippy::too_many_arguments)]
    pub fn start_relative_angle_control(
        &mut self,
        time_now: u32,
        count_now: i32,
        relative_target: i32,
        target_rate: i32,
        acceleration: i32,
        after_stop: Actuation,
    ) -> Result<()> {
        let base = if self.kind == ControlKind::Angle {
            self.trajectory.target()
        } else {
            count_now
        };
        let target = base.saturating_add(relative_target);
        let rate = target_rate
            .saturating_abs()
            .min(self.settings.max_rate.saturating_abs());

        self.trajectory = Trajectory::angle(time_now, base, target, rate, acceleration)?;
        self.position_integrator.reset(time_now);
        self.kind = ControlKind::Angle;
        self.on_target = OnTarget::Angle;
        self.after_stop = after_stop;
        self.last_count = count_now;
        self.is_on_target = false;
        self.stalled = false;

        debug!(
            "Angle control from {} to {} at {} counts/s",
            base, target, rate
        );
        Ok(())
    }

    /// Run at `target_rate` for `duration` µs, or forever when `None`.
    ///
    /// Without a `measured` state the maneuver continues smoothly from the
    /// current reference, which requires control to be active already.
    #[allow(clippy::too_many_arguments)]
    pub fn start_timed_control(
        &mut self,
        time_now: u32,
        duration: Option<u32>,
        measured: Option<Reference>,
        target_rate: i32,
        acceleration: i32,
        on_target: OnTarget,
        after_stop: Actuation,
    ) -> Result<()> {
        let start = match (measured, self.kind) {
            (Some(state), _) => {
                self.last_count = state.count;
                state
            }
            (None, ControlKind::Angle) => self
                .trajectory
                .reference(self.position_integrator.get_ref_time(time_now)),
            (None, ControlKind::Timed) => self.trajectory.reference(time_now),
            (None, ControlKind::None) => {
                return Err(DriveError::InvalidOperation(
                    "no state to start timed control from",
                ));
            }
        };

        let max_rate = self.settings.max_rate.saturating_abs();
        let rate = target_rate.clamp(-max_rate, max_rate);
        self.trajectory =
            Trajectory::timed(time_now, duration, start.count, start.rate, rate, acceleration)?;
        self.speed_integrator
            .reset(time_now, start.count.wrapping_sub(self.last_count));
        self.kind = ControlKind::Timed;
        self.on_target = on_target;
        self.after_stop = after_stop;
        self.is_on_target = false;
        self.stalled = false;

        debug!("Timed control at {} counts/s for {:?} us", rate, duration);
        Ok(())
    }

    fn pid(&self, error: i32, integral: i32, rate_error: i32) -> i32 {
        let s = &self.settings;
        let raw = s.pid_kp as i64 * error as i64
            + s.pid_ki as i64 * integral as i64 / 1000
            + s.pid_kd as i64 * rate_error as i64 / 1000;
        let raw = raw + raw.signum() * s.control_offset as i64;
        raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// One control cycle: returns the actuation kind and the control signal
    pub fn update(&mut self, time_now: u32, count: i32, rate: i32) -> (Actuation, i32) {
        if self.kind == ControlKind::None {
            return (Actuation::Coast, 0);
        }
        self.last_count = count;

        if self.trajectory.is_forever() && self.trajectory.age(time_now) > REBASE_AGE_US {
            self.trajectory.rebase(time_now);
        }

        let s = self.settings;
        let integral_max = s.integral_max();

        let (raw, error, reference, stalled, done) = match self.kind {
            ControlKind::Angle => {
                let time_ref = self.position_integrator.get_ref_time(time_now);
                let reference = self.trajectory.reference(time_ref);
                let error = reference.count.wrapping_sub(count);
                let remaining = self.trajectory.target().wrapping_sub(count);
                let integral = self.position_integrator.update(
                    time_now,
                    error,
                    remaining,
                    s.integral_range,
                    integral_max,
                    s.integral_rate,
                );
                let raw = self.pid(error, integral, reference.rate.wrapping_sub(rate));
                let stalled = self.position_integrator.stalled(
                    time_now,
                    rate,
                    reference.rate,
                    s.stall_time,
                    s.stall_rate_limit,
                    integral_max,
                );
                // A hold keeps servoing after the trajectory ends, so it
                // completes on the clock rather than on the paused reference
                let done = if self.after_stop == Actuation::Hold {
                    self.trajectory.is_done(time_now)
                } else {
                    self.trajectory.is_done(time_ref)
                };
                (raw, error, reference, stalled, done)
            }
            _ => {
                let reference = self.trajectory.reference(time_now);
                let error = reference.count.wrapping_sub(count);
                let integral = self.speed_integrator.get_error(error);
                let raw = self.pid(integral, 0, reference.rate.wrapping_sub(rate));
                let stalled = self.speed_integrator.stalled(
                    time_now,
                    rate,
                    reference.rate,
                    s.stall_time,
                    s.stall_rate_limit,
                );
                (raw, error, reference, stalled, self.trajectory.is_done(time_now))
            }
        };

        // Stop integrating while the actuator cannot push any harder toward the reference
        let max_control = s.max_control.saturating_abs();
        let saturated = raw.saturating_abs() >= max_control && raw.signum() == error.signum();
        match (self.kind, saturated) {
            (ControlKind::Angle, true) => self.position_integrator.pause(time_now),
            (ControlKind::Angle, false) => self.position_integrator.resume(time_now),
            (_, true) => self.speed_integrator.pause(time_now, error),
            (_, false) => self.speed_integrator.resume(time_now, error),
        }

        if stalled != self.stalled {
            if stalled {
                warn!("Stalled at count {} (reference {})", count, reference.count);
            } else {
                debug!("Stall cleared at count {}", count);
            }
            self.stalled = stalled;
        }

        let within_tolerance = self.trajectory.target().wrapping_sub(count).saturating_abs()
            <= s.count_tolerance
            && rate.saturating_abs() <= s.rate_tolerance;
        self.is_on_target = match self.on_target {
            OnTarget::Never => false,
            OnTarget::Time => done,
            OnTarget::Angle if self.after_stop == Actuation::Hold => done,
            OnTarget::Angle => done && within_tolerance,
        };

        let control = raw.clamp(-max_control, max_control);

        if self.is_on_target {
            return match self.after_stop {
                Actuation::Hold => (Actuation::Hold, control),
                Actuation::Duty => (Actuation::Duty, control),
                passive => {
                    self.stop();
                    (passive, 0)
                }
            };
        }
        (Actuation::Duty, control)
    }

    /// Reference count, reference rate and error integral for telemetry
    pub fn log_reference(&self, time_now: u32, count: i32) -> (i32, i32, i32) {
        match self.kind {
            ControlKind::None => (0, 0, 0),
            ControlKind::Angle => {
                let time_ref = self.position_integrator.get_ref_time(time_now);
                let reference = self.trajectory.reference(time_ref);
                (reference.count, reference.rate, self.position_integrator.integral())
            }
            ControlKind::Timed => {
                let reference = self.trajectory.reference(time_now);
                let integral = self
                    .speed_integrator
                    .get_error(reference.count.wrapping_sub(count));
                (reference.count, reference.rate, integral)
            }
        }
    }
}
