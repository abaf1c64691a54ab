// Message types exchanged with the runtime over zenoh, as JSON

use serde::{Deserialize, Serialize};

use crate::control::Actuation;
use crate::drivebase::{DriveSettings, DriveState};

// Command from teleop/scripts -> runtime
// Distances in mm, angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriveCommand {
    Straight {
        distance: i32,
        speed: Option<i32>,
        acceleration: Option<i32>,
    },
    Turn {
        angle: i32,
        rate: Option<i32>,
        acceleration: Option<i32>,
    },
    /// Continuous drive; must be repeated faster than the watchdog timeout
    Drive { speed: i32, turn_rate: i32 },
    Stop {
        #[serde(default = "default_after_stop")]
        then: Actuation,
    },
    StopForce,
    ResetState,
    Settings(DriveSettings),
}

fn default_after_stop() -> Actuation {
    Actuation::Coast
}

// State output from runtime -> observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveStateMsg {
    #[serde(flatten)]
    pub state: DriveState,
    pub active: bool,
    pub stalled: bool,
    /// Actuation applied in the last cycle, `None` while passive
    pub actuation: Option<Actuation>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fault,
}
