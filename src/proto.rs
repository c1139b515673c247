use std::time::Duration;

use self::response::Response;
use crate::psu::Fault;
use crate::scope::{AcquisitionState, Channel};

pub mod block;
pub mod codec;
pub mod command;
pub mod response;

#[cfg(test)]
pub mod fake;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Unable to open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("I/O error: {:?}", _0)]
    Io(#[from] std::io::Error),

    #[error("Serial I/O error: {:?}", _0)]
    Serial(#[from] tokio_serial::Error),

    #[error("No response within {:?}", _0)]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unable to parse response: {0:?}")]
    Parse(String),

    #[error("{operation} is not allowed while the acquisition is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: AcquisitionState,
    },

    #[error("Acquisition was cancelled")]
    Cancelled,

    #[error("Connection was closed")]
    Abort,

    #[error("Unexpected response: {:?}", _0)]
    Unexpected(Response),

    #[error("Channel {0} is not displayed")]
    ChannelOff(Channel),

    #[error("{what} {value} is out of range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Power supply rejected command: {0}")]
    PowerSupply(Fault),
}

impl ProtoError {
    /// Only a missed deadline is worth repeating as-is; everything else needs
    /// a reset or a code change first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
