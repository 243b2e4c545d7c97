//! Core library for talking to the Rev API: sessions, resource calls, uploads and task polling.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod forms;
pub mod logging;
pub mod measurements;
pub mod operation;
pub mod plants;
pub mod session;
pub mod tasks;
pub mod token_store;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use client::{IncidentTable, RevClient};
pub use config::{
    ApiSettings, ConfigError, ConfigLoadResult, ConfigSource, Credential, FileConfig, Identity,
    config_directory, config_path, load_config, save_config,
};
pub use endpoint::{Endpoint, Query, TemplateError, UrlTemplate};
pub use error::RevApiError;
pub use logging::{LogLevel, LoggingDestination, init_logging};
pub use measurements::{MeasurementFileError, OutputFormat};
pub use operation::{FormKind, IdKind, Operation, OperationShape};
pub use plants::PlantDirectory;
pub use session::Session;
pub use tasks::{PollPolicy, TaskKind, TaskOutcome};
pub use token_store::{TokenPair, TokenStore};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, RequestBody, Transport, TransportError,
};
pub use upload::UploadOutcome;

/// Build an authenticated-ready client for `identity` over HTTP.
pub fn connect(
    settings: &ApiSettings,
    credential: Credential,
) -> Result<RevClient<HttpTransport>, RevApiError> {
    let transport = HttpTransport::new(settings.request_timeout)?;
    let store = TokenStore::new(settings.token_path(credential.identity));
    let session = Session::new(settings, credential, store, transport)?;
    Ok(RevClient::new(session, settings))
}
