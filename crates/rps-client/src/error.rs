use thiserror::Error;

use rps_shared::{EligibilityError, PolicyError};

/// Why an event could not be recorded or a report could not be built.
/// Both are caller mistakes; nothing is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Invalid observation {input:?}: {reason}")]
    InvalidObservation { input: String, reason: String },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
