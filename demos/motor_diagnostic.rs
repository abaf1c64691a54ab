// Motor diagnostic: READ-ONLY check of the two wheel motors
//
// This tool does NOT write anything to the motors. Run it before the
// runtime to confirm ids, wiring and encoder readings.
//
// Usage: cargo run --example motor_diagnostic -- [port] [left_id] [right_id]
// Example: cargo run --example motor_diagnostic -- /dev/ttyACM0 7 9

use drivebase_runtime::config::{MOTOR_ID_LEFT, MOTOR_ID_RIGHT, MOTOR_PORT};
use drivebase_runtime::motor::feetech::{FeetechBus, Register, STEPS_PER_REVOLUTION};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| MOTOR_PORT.to_string());
    let left_id = args.next().map(|s| s.parse()).transpose()?.unwrap_or(MOTOR_ID_LEFT);
    let right_id = args.next().map(|s| s.parse()).transpose()?.unwrap_or(MOTOR_ID_RIGHT);
    let motors = [("Left", left_id), ("Right", right_id)];

    println!("Drivebase motor diagnostic (read-only)");
    println!();
    println!("Serial port: {}", port);
    println!("Motor ids: left={}, right={}", left_id, right_id);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match FeetechBus::open(&port) {
        Ok(bus) => {
            println!("  ✓ Serial port opened");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!("  - Check the port path and USB cable");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging motors...");
    let mut all_found = true;
    for (name, id) in motors {
        print!("  {} (ID {}): ", name, id);
        io::stdout().flush()?;

        match bus.ping(id) {
            Ok(true) => println!("✓ RESPONDING"),
            Ok(false) => {
                println!("✗ NO RESPONSE");
                all_found = false;
            }
            Err(e) => {
                println!("✗ ERROR: {}", e);
                all_found = false;
            }
        }
    }
    println!();

    if !all_found {
        println!("⚠ Not all motors responded; check power, wiring and ids.");
        println!();
    }

    println!("Step 3: Reading motor state...");
    println!();

    for (name, id) in motors {
        println!("  === {} (ID {}) ===", name, id);

        match bus.read_u8(id, Register::OperatingMode) {
            Ok(mode) => {
                let mode_str = match mode {
                    0 => "Position",
                    1 => "Velocity",
                    2 => "PWM (drivebase)",
                    3 => "Step",
                    _ => "Unknown",
                };
                println!("    Operating Mode:   {} ({})", mode, mode_str);
            }
            Err(e) => println!("    Operating Mode:   ERROR - {}", e),
        }

        match bus.read_u8(id, Register::TorqueEnable) {
            Ok(val) => {
                let status = if val == 1 { "ENABLED" } else { "disabled (coasting)" };
                println!("    Torque Enable:    {} ({})", val, status);
            }
            Err(e) => println!("    Torque Enable:    ERROR - {}", e),
        }

        match bus.read_feedback(id) {
            Ok(feedback) => {
                let degrees =
                    feedback.position as f32 * 360.0 / STEPS_PER_REVOLUTION as f32;
                println!("    Present Position: {} ({:.1}°)", feedback.position, degrees);
                println!("    Present Velocity: {} steps/s", feedback.velocity);
            }
            Err(e) => println!("    Present State:    ERROR - {}", e),
        }

        println!();
    }

    println!("Turn each wheel by hand and run again: forward rotation of both");
    println!("wheels should move the positions in opposite directions.");

    Ok(())
}
