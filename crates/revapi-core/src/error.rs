use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::endpoint::TemplateError;
use crate::measurements::MeasurementFileError;
use crate::operation::Operation;
use crate::token_store::TokenStoreError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum RevApiError {
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("URL template error: {0}")]
    Template(#[from] TemplateError),
    #[error("token storage error: {0}")]
    TokenStore(#[from] TokenStoreError),
    #[error("unknown plant '{name}'{}", did_you_mean(.suggestion))]
    InvalidPlant {
        name: String,
        suggestion: Option<String>,
    },
    #[error("invalid {kind} id '{value}'")]
    InvalidId { kind: &'static str, value: String },
    #[error("operation {} not allowed for user", .0.as_str().to_uppercase())]
    PermissionDenied(Operation),
    #[error("operation '{name}' not found{}", did_you_mean(.suggestion))]
    UnknownOperation {
        name: String,
        suggestion: Option<String>,
    },
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("measurement file error: {0}")]
    Measurements(#[from] MeasurementFileError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RevApiError {
    /// Transport-level failures that should abort the whole invocation.
    pub fn is_connection(&self) -> bool {
        matches!(self, RevApiError::Connection(_))
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(candidate) => format!(" (did you mean '{candidate}'?)"),
        None => String::new(),
    }
}

/// Closest candidate to `input` by Jaro-Winkler similarity, if reasonably close.
pub fn closest_match<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = input.to_ascii_lowercase();
    candidates
        .into_iter()
        .map(|candidate| {
            let score = strsim::jaro_winkler(&needle, &candidate.to_ascii_lowercase());
            (candidate, score)
        })
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.to_string())
}
