use clap::Parser;
use tracing_subscriber::EnvFilter;

use drivebase_runtime::config::{
    AXLE_TRACK_MM, MOTOR_ID_LEFT, MOTOR_ID_RIGHT, MOTOR_PORT, RuntimeConfig, WHEEL_DIAMETER_MM,
};

/// Two-wheel drivebase runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port of the Feetech motor bus
    #[arg(short, long, default_value = MOTOR_PORT)]
    port: String,

    /// Run against simulated motors
    #[arg(long)]
    sim: bool,

    /// Wheel diameter, mm
    #[arg(long, default_value_t = WHEEL_DIAMETER_MM)]
    wheel_diameter: i32,

    /// Distance between the wheel contact points, mm
    #[arg(long, default_value_t = AXLE_TRACK_MM)]
    axle_track: i32,

    #[arg(long, default_value_t = MOTOR_ID_LEFT)]
    left_id: u8,

    #[arg(long, default_value_t = MOTOR_ID_RIGHT)]
    right_id: u8,

    /// Record control telemetry for this many ms after startup
    #[arg(long)]
    log_duration: Option<u32>,
}

impl From<Args> for RuntimeConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            sim: args.sim,
            wheel_diameter_mm: args.wheel_diameter,
            axle_track_mm: args.axle_track,
            left_id: args.left_id,
            right_id: args.right_id,
            log_duration_ms: args.log_duration,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = RuntimeConfig::from(Args::parse());

    if let Err(e) = drivebase_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
