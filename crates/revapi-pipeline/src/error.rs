use std::io;

use revapi_core::{ConfigError, MeasurementFileError, RevApiError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Message(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },
    #[error("{label} request failed after {attempts} attempts: {reason}")]
    Fetch {
        label: String,
        attempts: usize,
        reason: String,
    },
    #[error("unexpected PRMT payload: {0}")]
    Payload(String),
    #[error("`{program}` failed: {reason}")]
    Command { program: String, reason: String },
    #[error("`{program}` did not report {expected} paths")]
    CommandOutput { program: String, expected: usize },
    #[error(transparent)]
    Api(#[from] RevApiError),
    #[error(transparent)]
    Settings(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Measurements(#[from] MeasurementFileError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn message<T: Into<String>>(message: T) -> Self {
        PipelineError::Message(message.into())
    }
}
