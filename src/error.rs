// Error taxonomy shared by the control core and the actuator interface

use crate::motor::feetech::FeetechError;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("No device")]
    NoDevice,

    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Motor bus error: {0}")]
    Bus(#[from] FeetechError),
}

pub type Result<T> = std::result::Result<T, DriveError>;
