//! Error types for the posture sentinel.

use std::time::Duration;

use thiserror::Error;

use crate::core_modules::landmarks::BodyPart;

/// A single failed attempt to open a stream source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpenError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("open timed out after {0:?}")]
    OpenTimeout(Duration),

    #[error("stream opened but the probe read failed: {0}")]
    NoProbeFrame(ReadFailure),
}

/// A transient, per-frame read problem. Never fatal on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadFailure {
    #[error("stream ended")]
    EndOfStream,

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("read error: {0}")]
    Io(String),
}

/// Raised when a connect cycle cannot produce a live handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("failed to connect to {source_id} after {attempts} attempts: {last}")]
    Exhausted {
        source_id: String,
        attempts: u32,
        last: OpenError,
    },

    #[error("connect to {0} cancelled by shutdown")]
    Cancelled(String),
}

/// Per-frame classification failures. The tick is skipped and the monitor is untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("landmark set is missing {0}")]
    IncompleteLandmarks(BodyPart),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("stream source identifier is empty")]
    EmptySource,
}

/// Raised by a `Notifier` that could not deliver an alert.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("alert delivery failed: {0}")]
pub struct NotifyError(pub String);
