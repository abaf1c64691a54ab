pub mod clock;
pub mod config;
pub mod control;
pub mod drivebase;
pub mod error;
pub mod fix16;
pub mod logger;
pub mod messages;
pub mod motor;
pub mod runtime;

pub use drivebase::{Drivebase, SetupError};
pub use error::{DriveError, Result};
