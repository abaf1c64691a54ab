// Keyboard teleop: W/S drive, A/D turn, R/F speed, arrows for fixed
// maneuvers, space hold, 0 reset odometry, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use drivebase_runtime::config::TOPIC_CMD_DRIVE;
use drivebase_runtime::control::Actuation;
use drivebase_runtime::messages::DriveCommand;
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [i32; 3] = [50, 150, 300]; // mm/s
const TURN_RATES: [i32; 3] = [30, 90, 180]; // deg/s
const STEP_DISTANCE: i32 = 100; // mm per arrow press
const STEP_ANGLE: i32 = 90; // deg per arrow press
const INPUT_TIMEOUT_MS: u64 = 100; // Stop driving after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;

    info!("Controls: W/S=drive, A/D=turn, arrows=step, space=hold, 0=reset, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &DriveCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Continuous drive state, refreshed while keys are held
    let mut speed = 0;
    let mut turn_rate = 0;
    let mut driving = false;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        speed = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        speed = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        turn_rate = TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        turn_rate = -TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Fixed maneuvers, finished by the runtime on its own
                    KeyCode::Up if kind == KeyEventKind::Press => {
                        let cmd = DriveCommand::Straight {
                            distance: STEP_DISTANCE,
                            speed: Some(SPEEDS[speed_idx]),
                            acceleration: None,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Down if kind == KeyEventKind::Press => {
                        let cmd = DriveCommand::Straight {
                            distance: -STEP_DISTANCE,
                            speed: Some(SPEEDS[speed_idx]),
                            acceleration: None,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Left if kind == KeyEventKind::Press => {
                        let cmd = DriveCommand::Turn {
                            angle: STEP_ANGLE,
                            rate: Some(TURN_RATES[speed_idx]),
                            acceleration: None,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Right if kind == KeyEventKind::Press => {
                        let cmd = DriveCommand::Turn {
                            angle: -STEP_ANGLE,
                            rate: Some(TURN_RATES[speed_idx]),
                            acceleration: None,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Char(' ') if kind == KeyEventKind::Press => {
                        send(publisher, &DriveCommand::Stop { then: Actuation::Hold }).await?;
                        driving = false;
                    }
                    KeyCode::Char('0') if kind == KeyEventKind::Press => {
                        send(publisher, &DriveCommand::ResetState).await?;
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Drop back to zero if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0;
            turn_rate = 0;
        }

        // Refresh a continuous drive at ~50Hz; coast once the keys are released
        if speed != 0 || turn_rate != 0 {
            send(publisher, &DriveCommand::Drive { speed, turn_rate }).await?;
            driving = true;
        } else if driving {
            send(publisher, &DriveCommand::Stop { then: Actuation::Coast }).await?;
            driving = false;
        }
    }

    send(publisher, &DriveCommand::Stop { then: Actuation::Coast }).await?;
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
