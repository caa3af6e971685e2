//! Error types for the watch face and its data sync

use alloc::string::String;
use thiserror_no_std::Error;

/// Problems turning a forecast row into a wire payload, or a data map back
/// into forecast cells.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("temperature is not a finite number")]
    NonFiniteTemperature,
    #[error("temperature {0} does not fit a 32-bit integer")]
    OutOfRange(f64),
    #[error("minimum temperature {min} exceeds maximum {max}")]
    InvertedRange { min: f64, max: f64 },
    #[error("key `{0}` is missing from the data map")]
    MissingKey(&'static str),
    #[error("key `{0}` does not hold an integer")]
    WrongType(String),
    #[error("data item could not be encoded")]
    Encoding,
}

/// Failures reported by a transport client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport client is not connected")]
    NotConnected,
    #[error("peer node is unreachable")]
    Unreachable,
    #[error("listener {0} is not registered")]
    UnknownListener(u32),
}

/// Failures of the background forecast refresh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    #[error("forecast row rejected: {0}")]
    InvalidRow(SyncError),
    #[error("refresh worker stopped before reporting back")]
    Aborted,
}

impl From<SyncError> for RefreshError {
    fn from(err: SyncError) -> Self {
        RefreshError::InvalidRow(err)
    }
}

/// Configuration loading and validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration could not be decoded")]
    Decode,
    #[error("configuration could not be encoded")]
    Encode,
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
