// Timeouts, topics, drivebase and motor configuration
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 100;

// Continuous drive stops if not refreshed within this time
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "drivebase/cmd"; // commands
pub const TOPIC_STATE: &str = "drivebase/state"; // odometry
pub const TOPIC_HEALTH: &str = "drivebase/health"; // health status

// Serial port for Feetech motor controller
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Feetech ids of the wheel motors
pub const MOTOR_ID_LEFT: u8 = 7;
pub const MOTOR_ID_RIGHT: u8 = 9;

// Geometry, mm
pub const WHEEL_DIAMETER_MM: i32 = 56;
pub const AXLE_TRACK_MM: i32 = 114;

// Simulated motor top speed, counts/s
pub const SIM_MAX_RATE: i32 = 1_000;

/// Everything the runtime needs to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub port: String,
    /// Simulated motors instead of the serial bus
    pub sim: bool,
    pub wheel_diameter_mm: i32,
    pub axle_track_mm: i32,
    pub left_id: u8,
    pub right_id: u8,
    /// Record telemetry for this long after startup, ms
    pub log_duration_ms: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            sim: false,
            wheel_diameter_mm: WHEEL_DIAMETER_MM,
            axle_track_mm: AXLE_TRACK_MM,
            left_id: MOTOR_ID_LEFT,
            right_id: MOTOR_ID_RIGHT,
            log_duration_ms: None,
        }
    }
}

impl RuntimeConfig {
    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(1000 / LOOP_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"sim":true}"#).unwrap();
        assert!(config.sim);
        assert_eq!(config.wheel_diameter_mm, WHEEL_DIAMETER_MM);
        assert_eq!(config.loop_period(), Duration::from_millis(10));
    }
}
