use std::time::Duration;

use thiserror::Error;

/// Inbound message could not be turned into something actionable.
/// These abort before actuation and never produce a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {0}")]
    Decode(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("command id '{0}' is missing")]
    MissingCommandId(String),
    #[error("wash slot is missing or not an integer")]
    InvalidSlot,
}

/// Actuation did not complete; reported as FAIL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuationError {
    #[error("wash slot {0} is not mapped to a channel")]
    UnmappedSlot(i64),
    #[error("wash command carries no slot")]
    MissingSlot,
    #[error("channel '{channel}': requested hold of {requested:?} exceeds the {limit:?} limit")]
    HoldTooLong {
        channel: String,
        requested: Duration,
        limit: Duration,
    },
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

impl ActuationError {
    /// True for faults raised by the relay interface (as opposed to request problems).
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware(_) | Self::HardwareFault(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("publish to '{topic}' failed: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
