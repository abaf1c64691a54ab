// Two-wheel drivebase coordinator
//
// Provides:
// - Straight, turn and continuous drive maneuvers on a distance and a heading axis
// - Per-cycle control update that turns axis signals into wheel duty
// - Odometry relative to a resettable origin
// - Telemetry rows for every control cycle

pub mod adopt;
pub mod kinematics;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::control::{Actuation, Control, ControlSettings, OnTarget, Reference};
use crate::error::{DriveError, Result};
use crate::fix16::Fix16;
use crate::logger::Logger;
use crate::motor::Actuator;

use adopt::adopt_settings;
use kinematics::{AxisState, axes_to_wheels, distance_counts_per_unit, heading_counts_per_unit, wheels_to_axes};

/// Values per telemetry row, before the logger's own time column
pub const DRIVEBASE_LOG_NUM_VALUES: usize = 15;

/// Odometry in user units: millimeters and degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveState {
    pub distance: i32,
    pub drive_speed: i32,
    pub angle: i32,
    pub turn_rate: i32,
}

/// Default speeds and accelerations used by `straight`/`turn` callers,
/// in mm/s, mm/s², deg/s and deg/s²
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveSettings {
    pub drive_speed: i32,
    pub drive_acceleration: i32,
    pub turn_rate: i32,
    pub turn_acceleration: i32,
}

/// A rejected setup, with both motors handed back untouched
#[derive(thiserror::Error)]
#[error("Drivebase setup failed: {error}")]
pub struct SetupError<A> {
    #[source]
    pub error: DriveError,
    pub left: A,
    pub right: A,
}

impl<A> fmt::Debug for SetupError<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupError").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<A> From<SetupError<A>> for DriveError {
    fn from(e: SetupError<A>) -> Self {
        e.error
    }
}

/// A pair of wheel actuators driven together.
///
/// The drivebase owns both actuators for as long as it lives; `release`
/// hands them back. Dropping a drivebase force-stops the motors.
pub struct Drivebase<A: Actuator> {
    left: Option<A>,
    right: Option<A>,
    clock: Arc<dyn Clock>,
    control_distance: Control,
    control_heading: Control,
    sum_offset: i32,
    dif_offset: i32,
    log: Logger,
}

impl<A: Actuator> Drivebase<A> {
    /// Take ownership of two wheel actuators.
    ///
    /// `wheel_diameter` and `axle_track` are in millimeters. Both motors must
    /// have the same gearing. A new drivebase has no motion of its own to
    /// stop, so the motors must answer the initial force-stop; on any error
    /// they are returned in the `SetupError`.
    pub fn setup(
        mut left: A,
        mut right: A,
        wheel_diameter: Fix16,
        axle_track: Fix16,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, SetupError<A>> {
        let (distance, heading) = match axis_settings(&left, &right, wheel_diameter, axle_track) {
            Ok(settings) => settings,
            Err(error) => return Err(SetupError { error, left, right }),
        };

        // Whatever the motors were doing before, they start out passive
        if let Err(error) = left.stop_force().and_then(|()| right.stop_force()) {
            warn!("Drivebase setup could not stop motors: {}", error);
            return Err(SetupError { error, left, right });
        }

        info!(
            "Drivebase ready: wheel {} mm, axle {} mm, {} counts/mm, {} counts/deg",
            wheel_diameter, axle_track, distance.counts_per_unit, heading.counts_per_unit
        );

        let mut drivebase = Self {
            left: Some(left),
            right: Some(right),
            clock,
            control_distance: Control::new(distance),
            control_heading: Control::new(heading),
            sum_offset: 0,
            dif_offset: 0,
            log: Logger::new(DRIVEBASE_LOG_NUM_VALUES),
        };
        drivebase.claim(false);
        Ok(drivebase)
    }

    /// Coast both motors and hand them back, unclaimed
    pub fn release(mut self) -> Result<(A, A)> {
        self.control_distance.stop();
        self.control_heading.stop();
        self.claim(false);
        let (Some(mut left), Some(mut right)) = (self.left.take(), self.right.take()) else {
            return Err(DriveError::NoDevice);
        };
        for motor in [&mut left, &mut right] {
            if let Err(e) = motor.coast() {
                warn!("Failed to coast motor on release: {}", e);
            }
        }
        Ok((left, right))
    }

    fn actuators(&mut self) -> Result<(&mut A, &mut A)> {
        match (self.left.as_mut(), self.right.as_mut()) {
            (Some(left), Some(right)) => Ok((left, right)),
            _ => Err(DriveError::NoDevice),
        }
    }

    /// Direct access to both motors, for simulation and diagnostics
    pub fn actuators_mut(&mut self) -> Result<(&mut A, &mut A)> {
        self.actuators()
    }

    /// Claim both motors for the drivebase, or release them for standalone use
    pub fn claim(&mut self, claim: bool) {
        for motor in [self.left.as_mut(), self.right.as_mut()].into_iter().flatten() {
            motor.stop_control();
            motor.set_claimed(claim);
        }
    }

    /// Current time and the distance and heading axis state, in counts
    fn physical_state(&mut self) -> Result<(u32, AxisState, AxisState)> {
        let time_now = self.clock.now_us();
        let (left, right) = self.actuators()?;
        let left_count = left.count()?;
        let right_count = right.count()?;
        let left_rate = left.rate()?;
        let right_rate = right.rate()?;
        let (sum, dif) = wheels_to_axes(
            AxisState::new(left_count, left_rate),
            AxisState::new(right_count, right_rate),
        );
        Ok((time_now, sum, dif))
    }

    /// Apply one actuation to both wheels
    pub fn actuate(&mut self, actuation: Actuation, sum_control: i32, dif_control: i32) -> Result<()> {
        match actuation {
            Actuation::Coast => {
                let (left, right) = self.actuators()?;
                left.coast()?;
                right.coast()?;
                self.claim(false);
            }
            Actuation::Brake => {
                let (left, right) = self.actuators()?;
                left.brake()?;
                right.brake()?;
                self.claim(false);
            }
            Actuation::Hold => {
                let settings = self.control_distance.settings();
                let rate = settings.counts_to_user(settings.max_rate);
                self.straight(0, rate, rate)?;
            }
            Actuation::Duty => {
                let (left_duty, right_duty) = axes_to_wheels(sum_control, dif_control);
                let (left, right) = self.actuators()?;
                left.set_duty_cycle(left_duty)?;
                right.set_duty_cycle(right_duty)?;
            }
        }
        Ok(())
    }

    fn log_update(
        &mut self,
        time_now: u32,
        sum: AxisState,
        sum_control: i32,
        dif: AxisState,
        dif_control: i32,
    ) -> Result<()> {
        if !self.log.is_active() {
            return Ok(());
        }
        let (sum_ref, sum_rate_ref, sum_integral) =
            self.control_distance.log_reference(time_now, sum.count);
        let (dif_ref, dif_rate_ref, dif_integral) =
            self.control_heading.log_reference(time_now, dif.count);

        // Each axis integral fills two columns
        let row = [
            time_now as i32,
            sum.count,
            sum.rate,
            sum_control,
            dif.count,
            dif.rate,
            dif_control,
            sum_ref,
            sum_integral,
            sum_rate_ref,
            sum_integral,
            dif_ref,
            dif_integral,
            dif_rate_ref,
            dif_integral,
        ];
        self.log.update(time_now, &row)
    }

    /// Run one control cycle. Returns the actuation applied, or `None` while
    /// the drivebase is passive.
    pub fn update(&mut self) -> Result<Option<Actuation>> {
        let (time_now, sum, dif) = self.physical_state()?;

        if !self.control_distance.is_active() || !self.control_heading.is_active() {
            self.log_update(time_now, sum, 0, dif, 0)?;
            return Ok(None);
        }

        let (sum_actuation, sum_control) = self.control_distance.update(time_now, sum.count, sum.rate);
        let (dif_actuation, dif_control) = self.control_heading.update(time_now, dif.count, dif.rate);

        // Both wheels share one actuation per cycle
        if sum_actuation != dif_actuation {
            warn!("Distance axis wants {} but heading axis wants {}", sum_actuation, dif_actuation);
            return Err(DriveError::InvalidOperation("axes disagree on actuation"));
        }
        let actuation = sum_actuation;

        if actuation == Actuation::Hold {
            // Keep servoing on the hold signal while the hold is renewed
            self.actuate(Actuation::Duty, sum_control, dif_control)?;
        }
        self.actuate(actuation, sum_control, dif_control)?;
        self.log_update(time_now, sum, sum_control, dif, dif_control)?;
        Ok(Some(actuation))
    }

    /// Drive `distance` mm and hold the end position
    pub fn straight(&mut self, distance: i32, drive_speed: i32, drive_acceleration: i32) -> Result<()> {
        self.claim(true);
        let (time_now, sum, dif) = self.physical_state()?;

        let sd = *self.control_distance.settings();
        let relative_target = sd.user_to_counts(distance);
        self.control_distance.start_relative_angle_control(
            time_now,
            sum.count,
            relative_target,
            sd.user_to_counts(drive_speed),
            sd.user_to_counts(drive_acceleration),
            Actuation::Hold,
        )?;

        // Heading holds still
        let sh = *self.control_heading.settings();
        self.control_heading.start_relative_angle_control(
            time_now,
            dif.count,
            0,
            sh.max_rate,
            sh.abs_acceleration,
            Actuation::Hold,
        )?;
        self.control_heading.align_completion(&self.control_distance);

        debug!("Straight {} mm ({} counts) at {} mm/s", distance, relative_target, drive_speed);
        Ok(())
    }

    /// Turn in place by `angle` degrees and hold the end heading
    pub fn turn(&mut self, angle: i32, turn_rate: i32, turn_acceleration: i32) -> Result<()> {
        self.claim(true);
        let (time_now, sum, dif) = self.physical_state()?;

        // Distance holds still
        let sd = *self.control_distance.settings();
        self.control_distance.start_relative_angle_control(
            time_now,
            sum.count,
            0,
            sd.max_rate,
            sd.abs_acceleration,
            Actuation::Hold,
        )?;

        let sh = *self.control_heading.settings();
        let relative_target = sh.user_to_counts(angle);
        self.control_heading.start_relative_angle_control(
            time_now,
            dif.count,
            relative_target,
            sh.user_to_counts(turn_rate),
            sh.user_to_counts(turn_acceleration),
            Actuation::Hold,
        )?;
        self.control_distance.align_completion(&self.control_heading);

        debug!("Turn {} deg ({} counts) at {} deg/s", angle, relative_target, turn_rate);
        Ok(())
    }

    /// Drive at `drive_speed` mm/s while turning at `turn_rate` deg/s until stopped
    pub fn drive(&mut self, drive_speed: i32, turn_rate: i32) -> Result<()> {
        self.claim(true);

        // A running maneuver continues from its own reference, so the motors
        // only need to be read when starting from rest
        let (time_now, sum, dif) =
            if self.control_distance.is_active() && self.control_heading.is_active() {
                (self.clock.now_us(), None, None)
            } else {
                let (time_now, sum, dif) = self.physical_state()?;
                let measured = |state: AxisState| Reference {
                    count: state.count,
                    rate: state.rate,
                };
                (time_now, Some(measured(sum)), Some(measured(dif)))
            };

        let sd = *self.control_distance.settings();
        self.control_distance.start_timed_control(
            time_now,
            None,
            sum,
            sd.user_to_counts(drive_speed),
            sd.abs_acceleration,
            OnTarget::Never,
            Actuation::Coast,
        )?;

        let sh = *self.control_heading.settings();
        self.control_heading.start_timed_control(
            time_now,
            None,
            dif,
            sh.user_to_counts(turn_rate),
            sh.abs_acceleration,
            OnTarget::Never,
            Actuation::Coast,
        )?;

        debug!("Drive at {} mm/s, {} deg/s", drive_speed, turn_rate);
        Ok(())
    }

    /// End any maneuver and apply `after_stop`. Holding keeps the current
    /// position: with both axes stopped, the hold starts from a fresh sample.
    pub fn stop(&mut self, after_stop: Actuation) -> Result<()> {
        self.control_distance.stop();
        self.control_heading.stop();
        debug!("Stop with {}", after_stop);
        self.actuate(after_stop, 0, 0)
    }

    /// End control and make both motors passive, regardless of state
    pub fn stop_force(&mut self) -> Result<()> {
        self.control_distance.stop();
        self.control_heading.stop();
        let (left, right) = self.actuators()?;
        left.stop_force()?;
        right.stop_force()
    }

    /// Distance driven and angle turned since the last reset
    pub fn get_state(&mut self) -> Result<DriveState> {
        let (_, sum, dif) = self.physical_state()?;
        let sd = self.control_distance.settings();
        let sh = self.control_heading.settings();
        Ok(DriveState {
            distance: sd.counts_to_user(sum.count.wrapping_sub(self.sum_offset)),
            drive_speed: sd.counts_to_user(sum.rate),
            angle: sh.counts_to_user(dif.count.wrapping_sub(self.dif_offset)),
            turn_rate: sh.counts_to_user(dif.rate),
        })
    }

    /// Make the current position the origin
    pub fn reset_state(&mut self) -> Result<()> {
        let (_, sum, dif) = self.physical_state()?;
        self.sum_offset = sum.count;
        self.dif_offset = dif.count;
        Ok(())
    }

    pub fn get_drive_settings(&self) -> DriveSettings {
        let sd = self.control_distance.settings();
        let sh = self.control_heading.settings();
        DriveSettings {
            drive_speed: sd.counts_to_user(sd.max_rate),
            drive_acceleration: sd.counts_to_user(sd.abs_acceleration),
            turn_rate: sh.counts_to_user(sh.max_rate),
            turn_acceleration: sh.counts_to_user(sh.abs_acceleration),
        }
    }

    pub fn set_drive_settings(&mut self, settings: DriveSettings) {
        let sd = self.control_distance.settings_mut();
        sd.max_rate = sd.user_to_counts(settings.drive_speed);
        sd.abs_acceleration = sd.user_to_counts(settings.drive_acceleration);
        let sh = self.control_heading.settings_mut();
        sh.max_rate = sh.user_to_counts(settings.turn_rate);
        sh.abs_acceleration = sh.user_to_counts(settings.turn_acceleration);
    }

    pub fn distance_settings(&self) -> &ControlSettings {
        self.control_distance.settings()
    }

    pub fn heading_settings(&self) -> &ControlSettings {
        self.control_heading.settings()
    }

    /// A maneuver is in progress
    pub fn is_active(&self) -> bool {
        self.control_distance.is_active() || self.control_heading.is_active()
    }

    /// The running maneuver is a continuous `drive`
    pub fn is_driving(&self) -> bool {
        self.control_distance.is_active() && self.control_distance.trajectory().is_forever()
    }

    pub fn is_stalled(&self) -> bool {
        self.control_distance.is_stalled() || self.control_heading.is_stalled()
    }

    /// Relative target of the running distance and heading maneuvers, in counts
    pub fn targets(&self) -> (i32, i32) {
        let relative = |control: &Control| {
            let trajectory = control.trajectory();
            trajectory
                .target()
                .wrapping_sub(trajectory.reference(trajectory.start_time()).count)
        };
        (relative(&self.control_distance), relative(&self.control_heading))
    }

    /// Start recording one telemetry row per `loop_ms` cycle for `duration_ms`
    pub fn start_log(&mut self, duration_ms: u32, loop_ms: u32) -> Result<()> {
        let time_now = self.clock.now_us();
        self.log.start(time_now, duration_ms, 1, loop_ms)
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut Logger {
        &mut self.log
    }
}

/// Distance and heading axis settings from the motors and the geometry
fn axis_settings<A: Actuator>(
    left: &A,
    right: &A,
    wheel_diameter: Fix16,
    axle_track: Fix16,
) -> Result<(ControlSettings, ControlSettings)> {
    if !wheel_diameter.is_positive() || !axle_track.is_positive() {
        return Err(DriveError::InvalidArgument("wheel diameter and axle track must be positive"));
    }
    if left.counts_per_unit() != right.counts_per_unit() {
        return Err(DriveError::InvalidArgument("left and right motors have different gearing"));
    }

    let motor_cpu = left.counts_per_unit();
    let mut distance = adopt_settings(left.settings(), right.settings())?;
    let mut heading = distance;
    distance.counts_per_unit = distance_counts_per_unit(motor_cpu, wheel_diameter);
    heading.counts_per_unit = heading_counts_per_unit(motor_cpu, wheel_diameter, axle_track);
    Ok((distance, heading))
}

impl<A: Actuator> Drop for Drivebase<A> {
    fn drop(&mut self) {
        match self.stop_force() {
            Ok(()) | Err(DriveError::NoDevice) => {}
            Err(e) => warn!("Failed to stop drivebase on drop: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::motor::{Direction, SimMotor};

    const LOOP_US: u32 = 10_000;

    fn motors() -> (SimMotor, SimMotor) {
        (
            SimMotor::new(ControlSettings::default(), Direction::Counterclockwise, 1_000),
            SimMotor::new(ControlSettings::default(), Direction::Clockwise, 1_000),
        )
    }

    fn drivebase() -> (Drivebase<SimMotor>, ManualClock) {
        let clock = ManualClock::new(0);
        let (left, right) = motors();
        let db = Drivebase::setup(
            left,
            right,
            Fix16::from_int(56),
            Fix16::from_int(114),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (db, clock)
    }

    fn run(db: &mut Drivebase<SimMotor>, clock: &ManualClock, cycles: usize) -> Option<Actuation> {
        let mut last = None;
        for _ in 0..cycles {
            clock.advance(LOOP_US);
            let (left, right) = db.actuators_mut().unwrap();
            left.step(LOOP_US);
            right.step(LOOP_US);
            last = db.update().unwrap();
        }
        last
    }

    fn assert_released(db: &mut Drivebase<SimMotor>) {
        let (left, right) = db.actuators_mut().unwrap();
        assert!(left.is_coasting() && right.is_coasting());
        assert!(!left.is_claimed() && !right.is_claimed());
    }

    #[test]
    fn test_setup_rejects_bad_geometry() {
        for (diameter, axle) in [(0, 114), (56, 0), (-56, 114)] {
            let (left, right) = motors();
            let result = Drivebase::setup(
                left,
                right,
                Fix16::from_int(diameter),
                Fix16::from_int(axle),
                Arc::new(ManualClock::new(0)),
            );
            let Err(SetupError { error, mut left, .. }) = result else {
                panic!("setup accepted diameter {} and axle {}", diameter, axle);
            };
            assert!(matches!(error, DriveError::InvalidArgument(_)));
            // The motors come back usable on their own
            assert!(!left.is_claimed());
            left.run_duty(1_000).unwrap();
        }
    }

    #[test]
    fn test_setup_rejects_mismatched_gearing() {
        let left = SimMotor::new(ControlSettings::default(), Direction::Clockwise, 1_000);
        let geared = ControlSettings {
            counts_per_unit: Fix16::from_int(3),
            ..ControlSettings::default()
        };
        let right = SimMotor::new(geared, Direction::Clockwise, 1_000);
        let result = Drivebase::setup(
            left,
            right,
            Fix16::from_int(56),
            Fix16::from_int(114),
            Arc::new(ManualClock::new(0)),
        );
        let error = result.err().map(DriveError::from);
        assert!(matches!(error, Some(DriveError::InvalidArgument(_))));
    }

    #[test]
    fn test_setup_with_disconnected_motor_returns_both() {
        let (left, mut right) = motors();
        right.set_connected(false);
        let result = Drivebase::setup(
            left,
            right,
            Fix16::from_int(56),
            Fix16::from_int(114),
            Arc::new(ManualClock::new(0)),
        );
        let Err(SetupError { error, left, mut right }) = result else {
            panic!("setup accepted a disconnected motor");
        };
        assert!(matches!(error, DriveError::NoDevice));

        // Once reconnected the same motors set up fine
        right.set_connected(true);
        let db = Drivebase::setup(
            left,
            right,
            Fix16::from_int(56),
            Fix16::from_int(114),
            Arc::new(ManualClock::new(0)),
        );
        assert!(db.is_ok());
    }

    #[test]
    fn test_setup_adopts_motor_settings() {
        let (db, _) = drivebase();
        let d = ControlSettings::default();
        assert_eq!(db.distance_settings().max_rate, 2 * d.max_rate);
        assert_eq!(db.heading_settings().pid_kp, db.distance_settings().pid_kp);
        assert!(db.distance_settings().counts_per_unit > db.heading_settings().counts_per_unit);
    }

    #[test]
    fn test_passive_update_returns_none() {
        let (mut db, clock) = drivebase();
        assert_eq!(run(&mut db, &clock, 3), None);
        assert!(!db.is_active());
    }

    #[test]
    fn test_straight_claims_and_sets_targets() {
        let (mut db, _) = drivebase();
        db.straight(100, 100, 200).unwrap();

        let (left, right) = db.actuators_mut().unwrap();
        assert!(left.is_claimed() && right.is_claimed());
        let (distance, heading) = db.targets();
        assert_eq!(distance, db.distance_settings().user_to_counts(100));
        assert_eq!(heading, 0);
    }

    #[test]
    fn test_claimed_motors_reject_standalone_duty() {
        let (mut db, _) = drivebase();
        db.drive(50, 0).unwrap();
        let (left, _) = db.actuators_mut().unwrap();
        assert!(matches!(left.run_duty(1_000), Err(DriveError::InvalidOperation(_))));
    }

    #[test]
    fn test_turn_spins_wheels_opposite() {
        let (mut db, clock) = drivebase();
        db.turn(90, 90, 360).unwrap();
        run(&mut db, &clock, 30);

        let (left, right) = db.actuators_mut().unwrap();
        let (left_rate, right_rate) = (left.rate().unwrap(), right.rate().unwrap());
        assert!(left_rate > 0 && right_rate < 0);
        assert!(db.get_state().unwrap().angle > 0);
    }

    #[test]
    fn test_drive_moves_forward_until_stopped() {
        let (mut db, clock) = drivebase();
        db.drive(100, 0).unwrap();
        assert!(db.is_driving());
        assert_eq!(run(&mut db, &clock, 100), Some(Actuation::Duty));

        let state = db.get_state().unwrap();
        assert!(state.distance > 50);
        assert!((state.drive_speed - 100).abs() <= 20);

        db.stop(Actuation::Coast).unwrap();
        assert_released(&mut db);
        assert!(!db.is_active());
    }

    #[test]
    fn test_hold_against_coast_is_invalid() {
        let (mut db, clock) = drivebase();
        db.claim(true);
        db.control_distance
            .start_relative_angle_control(0, 0, 0, 100, 100, Actuation::Coast)
            .unwrap();
        db.control_heading
            .start_relative_angle_control(0, 0, 0, 100, 100, Actuation::Hold)
            .unwrap();
        clock.advance(LOOP_US);

        assert!(matches!(db.update(), Err(DriveError::InvalidOperation(_))));
    }

    #[test]
    fn test_hold_against_duty_is_invalid() {
        let (mut db, clock) = drivebase();
        db.claim(true);
        // Distance is already holding, heading still has to move
        db.control_distance
            .start_relative_angle_control(0, 0, 0, 100, 100, Actuation::Hold)
            .unwrap();
        db.control_heading
            .start_relative_angle_control(0, 0, 5_000, 100, 100, Actuation::Hold)
            .unwrap();
        clock.advance(LOOP_US);

        assert!(matches!(db.update(), Err(DriveError::InvalidOperation(_))));
    }

    #[test]
    fn test_straight_axes_finish_together() {
        let (mut db, clock) = drivebase();
        db.straight(100, 100, 200).unwrap();
        let end = db.control_distance.trajectory().duration().unwrap();
        assert_eq!(db.control_heading.trajectory().duration(), Some(end));

        // Every cycle agrees: duty until the maneuver is over, then hold
        let cycles = (end / LOOP_US) as usize;
        assert_eq!(run(&mut db, &clock, cycles - 1), Some(Actuation::Duty));
        assert_eq!(run(&mut db, &clock, 2), Some(Actuation::Hold));
    }

    #[test]
    fn test_reset_state_zeroes_odometry() {
        let (mut db, clock) = drivebase();
        db.drive(150, 30).unwrap();
        run(&mut db, &clock, 50);
        db.stop(Actuation::Brake).unwrap();
        run(&mut db, &clock, 1);

        db.reset_state().unwrap();
        let state = db.get_state().unwrap();
        assert!(state.distance.abs() <= 1);
        assert!(state.angle.abs() <= 1);
    }

    #[test]
    fn test_stop_coast_from_any_state() {
        let (mut db, clock) = drivebase();
        db.stop(Actuation::Coast).unwrap();
        assert_released(&mut db);

        db.straight(200, 100, 200).unwrap();
        run(&mut db, &clock, 10);
        db.stop(Actuation::Coast).unwrap();
        assert_released(&mut db);

        db.drive(100, 20).unwrap();
        run(&mut db, &clock, 10);
        db.stop(Actuation::Coast).unwrap();
        assert_released(&mut db);
        assert_eq!(run(&mut db, &clock, 2), None);
    }

    #[test]
    fn test_stop_hold_keeps_position() {
        let (mut db, clock) = drivebase();
        db.drive(100, 0).unwrap();
        run(&mut db, &clock, 30);
        db.stop(Actuation::Hold).unwrap();

        let (distance, heading) = db.targets();
        assert_eq!((distance, heading), (0, 0));
        let (left, right) = db.actuators_mut().unwrap();
        assert!(left.is_claimed() && right.is_claimed());
    }

    #[test]
    fn test_drive_settings_round_trip() {
        let (mut db, _) = drivebase();
        let wanted = DriveSettings {
            drive_speed: 200,
            drive_acceleration: 800,
            turn_rate: 90,
            turn_acceleration: 360,
        };
        db.set_drive_settings(wanted);
        let got = db.get_drive_settings();
        assert!((got.drive_speed - 200).abs() <= 1);
        assert!((got.drive_acceleration - 800).abs() <= 1);
        assert!((got.turn_rate - 90).abs() <= 1);
        assert!((got.turn_acceleration - 360).abs() <= 1);
    }

    #[test]
    fn test_stop_force_reports_missing_motor() {
        let (mut db, _) = drivebase();
        db.drive(100, 0).unwrap();
        db.actuators_mut().unwrap().1.set_connected(false);
        assert!(matches!(db.stop_force(), Err(DriveError::NoDevice)));
        assert!(!db.is_active());
    }

    #[test]
    fn test_release_returns_unclaimed_motors() {
        let (mut db, _) = drivebase();
        db.straight(100, 100, 200).unwrap();
        let (mut left, right) = db.release().unwrap();
        assert!(!left.is_claimed() && !right.is_claimed());
        left.run_duty(1_000).unwrap();
    }

    #[test]
    fn test_log_records_rows() {
        let (mut db, clock) = drivebase();
        db.start_log(1_000, 10).unwrap();
        db.drive(100, 0).unwrap();
        run(&mut db, &clock, 5);

        assert_eq!(db.log().rows(), 5);
        assert_eq!(db.log().cols(), 16);
        let row = db.log().read(-1).unwrap();
        // Both copies of each axis integral agree
        assert_eq!(row[9], row[11]);
        assert_eq!(row[13], row[15]);
    }
}
