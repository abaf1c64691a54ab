// Fixed-rate control loop with watchdog
//
// Every tick drains drive commands from zenoh, runs one drivebase control
// cycle and publishes odometry and health. A continuous drive that is not
// refreshed within CMD_TIMEOUT is stopped, so a crashed teleop cannot leave
// the robot running.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::clock::{ManualClock, MonotonicClock};
use crate::config::{CMD_TIMEOUT, LOOP_HZ, RuntimeConfig, SIM_MAX_RATE, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_STATE};
use crate::control::{Actuation, ControlSettings};
use crate::drivebase::Drivebase;
use crate::error::{DriveError, Result};
use crate::fix16::Fix16;
use crate::messages::{DriveCommand, DriveStateMsg, RuntimeHealth};
use crate::motor::{Actuator, Direction, FeetechBus, FeetechMotor, SimMotor};

pub struct Runtime<A: Actuator> {
    drivebase: Drivebase<A>,
    drive_refreshed_at: Option<Instant>,
    drive_command: Option<(i32, i32)>,
    actuation: Option<Actuation>,
    health: RuntimeHealth,
}

impl<A: Actuator> Runtime<A> {
    pub fn new(drivebase: Drivebase<A>) -> Self {
        Self {
            drivebase,
            drive_refreshed_at: None,
            drive_command: None,
            actuation: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn drivebase_mut(&mut self) -> &mut Drivebase<A> {
        &mut self.drivebase
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand, now: Instant) -> Result<()> {
        debug!("Received command: {:?}", &cmd);
        let defaults = self.drivebase.get_drive_settings();

        match cmd {
            DriveCommand::Straight {
                distance,
                speed,
                acceleration,
            } => self.drivebase.straight(
                distance,
                speed.unwrap_or(defaults.drive_speed),
                acceleration.unwrap_or(defaults.drive_acceleration),
            )?,
            DriveCommand::Turn {
                angle,
                rate,
                acceleration,
            } => self.drivebase.turn(
                angle,
                rate.unwrap_or(defaults.turn_rate),
                acceleration.unwrap_or(defaults.turn_acceleration),
            )?,
            DriveCommand::Drive { speed, turn_rate } => {
                // Repeats only keep the watchdog fed; restarting the
                // maneuver would discard the accumulated tracking error
                let command = Some((speed, turn_rate));
                if !self.drivebase.is_driving() || self.drive_command != command {
                    self.drivebase.drive(speed, turn_rate)?;
                    self.drive_command = command;
                }
                self.drive_refreshed_at = Some(now);
            }
            DriveCommand::Stop { then } => self.drivebase.stop(then)?,
            DriveCommand::StopForce => self.drivebase.stop_force()?,
            DriveCommand::ResetState => self.drivebase.reset_state()?,
            DriveCommand::Settings(settings) => self.drivebase.set_drive_settings(settings),
        }

        if self.health == RuntimeHealth::CmdStale {
            self.health = RuntimeHealth::Ok;
        }
        Ok(())
    }

    /// Stop a continuous drive whose command has gone stale
    pub fn check_watchdog(&mut self, now: Instant) -> Result<()> {
        if !self.drivebase.is_driving() {
            self.drive_refreshed_at = None;
            self.drive_command = None;
            return Ok(());
        }
        let age = self
            .drive_refreshed_at
            .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
        if age > CMD_TIMEOUT {
            warn!("Drive command stale ({:?} old), stopping", age);
            self.health = RuntimeHealth::CmdStale;
            self.drive_refreshed_at = None;
            self.drive_command = None;
            self.drivebase.stop(Actuation::Coast)?;
        }
        Ok(())
    }

    /// One control cycle
    pub fn tick(&mut self) -> DriveStateMsg {
        match self.drivebase.update() {
            Ok(actuation) => {
                self.actuation = actuation;
                if self.health == RuntimeHealth::Fault {
                    info!("Drivebase recovered");
                    self.health = RuntimeHealth::Ok;
                }
            }
            Err(e) => {
                if self.health != RuntimeHealth::Fault {
                    warn!("Drivebase update failed: {}", e);
                }
                self.health = RuntimeHealth::Fault;
            }
        }

        let state = match self.drivebase.get_state() {
            Ok(state) => state,
            Err(e) => {
                debug!("Failed to read drivebase state: {}", e);
                Default::default()
            }
        };
        DriveStateMsg {
            state,
            active: self.drivebase.is_active(),
            stalled: self.drivebase.is_stalled(),
            actuation: self.actuation,
        }
    }
}

pub async fn run(config: RuntimeConfig) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wheel_diameter = Fix16::from_int(config.wheel_diameter_mm);
    let axle_track = Fix16::from_int(config.axle_track_mm);

    if config.sim {
        info!("Using simulated motors");
        let clock = ManualClock::new(0);
        let settings = ControlSettings::default();
        let left = SimMotor::new(settings, Direction::Counterclockwise, SIM_MAX_RATE);
        let right = SimMotor::new(settings, Direction::Clockwise, SIM_MAX_RATE);
        let drivebase = Drivebase::setup(left, right, wheel_diameter, axle_track, Arc::new(clock.clone()))
            .map_err(DriveError::from)?;

        let period_us = config.loop_period().as_micros() as u32;
        serve(&config, drivebase, move |drivebase| {
            clock.advance(period_us);
            if let Ok((left, right)) = drivebase.actuators_mut() {
                left.step(period_us);
                right.step(period_us);
            }
        })
        .await
    } else {
        info!("Opening motor bus on {}", config.port);
        let bus = Arc::new(Mutex::new(FeetechBus::open(&config.port)?));
        let left = FeetechMotor::new(bus.clone(), config.left_id, Direction::Counterclockwise)?;
        let right = FeetechMotor::new(bus, config.right_id, Direction::Clockwise)?;
        let drivebase = Drivebase::setup(left, right, wheel_diameter, axle_track, Arc::new(MonotonicClock::new()))
            .map_err(DriveError::from)?;
        serve(&config, drivebase, |_| {}).await
    }
}

async fn serve<A: Actuator>(
    config: &RuntimeConfig,
    mut drivebase: Drivebase<A>,
    mut before_update: impl FnMut(&mut Drivebase<A>),
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(duration_ms) = config.log_duration_ms {
        let loop_ms = config.loop_period().as_millis() as u32;
        drivebase.start_log(duration_ms, loop_ms)?;
        info!("Recording telemetry for {} ms", duration_ms);
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(drivebase);
    let mut tick = interval(config.loop_period());

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_STATE, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
        let now = Instant::now();

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => {
                    if let Err(e) = runtime.on_command(cmd, now) {
                        warn!("Command rejected: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog
        if let Err(e) = runtime.check_watchdog(now) {
            warn!("Watchdog failed to stop drivebase: {}", e);
        }

        // 3. Control cycle
        before_update(runtime.drivebase_mut());
        let state = runtime.tick();

        // 4. Publish state and health
        let state_json = serde_json::to_string(&state)?;
        pub_state.put(state_json).await?;

        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    let drivebase = runtime.drivebase_mut();
    drivebase.stop(Actuation::Coast)?;
    let log = drivebase.log();
    info!("Telemetry: {} rows of {} columns", log.rows(), log.cols());
    for index in 0..log.rows() as i32 {
        debug!("{:?}", log.read(index)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP_US: u32 = 10_000;

    fn runtime() -> (Runtime<SimMotor>, ManualClock) {
        let clock = ManualClock::new(0);
        let settings = ControlSettings::default();
        let drivebase = Drivebase::setup(
            SimMotor::new(settings, Direction::Counterclockwise, SIM_MAX_RATE),
            SimMotor::new(settings, Direction::Clockwise, SIM_MAX_RATE),
            Fix16::from_int(56),
            Fix16::from_int(114),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (Runtime::new(drivebase), clock)
    }

    fn step(runtime: &mut Runtime<SimMotor>, clock: &ManualClock) -> DriveStateMsg {
        clock.advance(LOOP_US);
        let (left, right) = runtime.drivebase_mut().actuators_mut().unwrap();
        left.step(LOOP_US);
        right.step(LOOP_US);
        runtime.tick()
    }

    #[test]
    fn test_starts_stale_until_command() {
        let (mut runtime, _) = runtime();
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        runtime
            .on_command(DriveCommand::ResetState, Instant::now())
            .unwrap();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_stops_stale_drive() {
        let (mut runtime, clock) = runtime();
        let start = Instant::now();
        runtime
            .on_command(DriveCommand::Drive { speed: 100, turn_rate: 0 }, start)
            .unwrap();
        let msg = step(&mut runtime, &clock);
        assert!(msg.active);
        assert_eq!(msg.actuation, Some(Actuation::Duty));

        runtime.check_watchdog(start + CMD_TIMEOUT / 2).unwrap();
        assert!(runtime.drivebase_mut().is_driving());

        runtime
            .check_watchdog(start + CMD_TIMEOUT + Duration::from_millis(1))
            .unwrap();
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert!(!runtime.drivebase_mut().is_active());
        assert_eq!(step(&mut runtime, &clock).actuation, None);
    }

    #[test]
    fn test_repeated_drive_keeps_tracking() {
        let (mut runtime, clock) = runtime();
        let start = Instant::now();
        for i in 0..100 {
            let now = start + Duration::from_millis(10 * i);
            runtime
                .on_command(DriveCommand::Drive { speed: 100, turn_rate: 0 }, now)
                .unwrap();
            runtime.check_watchdog(now).unwrap();
            step(&mut runtime, &clock);
        }
        let msg = step(&mut runtime, &clock);
        assert!((msg.state.drive_speed - 100).abs() <= 20);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_ignores_finite_maneuvers() {
        let (mut runtime, _) = runtime();
        let start = Instant::now();
        runtime
            .on_command(
                DriveCommand::Straight {
                    distance: 100,
                    speed: None,
                    acceleration: None,
                },
                start,
            )
            .unwrap();
        runtime
            .check_watchdog(start + CMD_TIMEOUT * 10)
            .unwrap();
        assert!(runtime.drivebase_mut().is_active());
    }

    #[test]
    fn test_update_failure_reports_fault() {
        let (mut runtime, clock) = runtime();
        runtime.drivebase_mut().actuators_mut().unwrap().0.set_connected(false);
        clock.advance(LOOP_US);
        runtime.tick();
        assert_eq!(runtime.health(), RuntimeHealth::Fault);

        runtime.drivebase_mut().actuators_mut().unwrap().0.set_connected(true);
        runtime.tick();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }
}
