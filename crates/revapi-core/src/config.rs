use crate::endpoint::{Endpoint, EndpointTable, TemplateError};
use crate::tasks::PollPolicy;
use dirs::config_dir;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "revapi";
const CONFIG_FILE_NAME: &str = "config.toml";
const TOKEN_DIR_NAME: &str = "tokens";
const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 1_500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const CONFIG_PATH_VAR: &str = "REVAPI_CONFIG";
pub const BASE_URL_VAR: &str = "REVAPI_BASE_URL";
pub const TOKEN_DIR_VAR: &str = "REVAPI_TOKEN_DIR";

/// Which agent identity a session acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    Admin,
    User,
}

impl Identity {
    /// Prefix of the environment variables holding this identity's credentials.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Identity::Admin => "API_ADMIN_",
            Identity::User => "API_",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Identity::Admin => "admin",
            Identity::User => "user",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair for one identity, fixed for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity: Identity,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(
        identity: Identity,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `<PREFIX>USERNAME` / `<PREFIX>PASSWORD` through `lookup`.
    pub fn from_env<F>(identity: Identity, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            let var = format!("{}{}", identity.env_prefix(), suffix);
            lookup(&var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingCredential { identity, var })
        };
        Ok(Self {
            identity,
            username: read("USERNAME")?,
            password: read("PASSWORD")?,
        })
    }
}

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
    #[error("no base URL configured; set base_url in config.toml or REVAPI_BASE_URL")]
    MissingBaseUrl,
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("missing {identity} credential: {var} is not set")]
    MissingCredential { identity: Identity, var: String },
    #[error("invalid endpoint template: {0}")]
    Template(#[from] TemplateError),
    #[error("{0}")]
    Invalid(String),
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "FileConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "FileConfig::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub polling: PollingPreferences,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub token_dir: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            polling: PollingPreferences::default(),
            endpoints: BTreeMap::new(),
            token_dir: None,
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    const fn default_request_timeout_secs() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }

    const fn default_chunk_size() -> usize {
        DEFAULT_CHUNK_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingPreferences {
    #[serde(default = "PollingPreferences::default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "PollingPreferences::default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingPreferences {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl PollingPreferences {
    const fn default_interval_ms() -> u64 {
        DEFAULT_POLL_INTERVAL_MS
    }

    const fn default_max_attempts() -> u32 {
        DEFAULT_POLL_MAX_ATTEMPTS
    }
}

/// Fully resolved settings handed to the session and the client.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub endpoints: EndpointTable,
    pub request_timeout: Duration,
    pub chunk_size: usize,
    pub poll: PollPolicy,
    pub token_dir: PathBuf,
}

impl ApiSettings {
    /// Combine the file configuration with environment overrides.
    pub fn resolve<F>(config: &FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup(BASE_URL_VAR)
            .or_else(|| config.base_url.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = parse_base_url(&raw_base)?;

        if config.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if config.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }

        let overrides = config
            .endpoints
            .iter()
            .filter_map(|(key, template)| {
                Endpoint::from_key(key).map(|endpoint| (endpoint, template.clone()))
            })
            .collect();
        let endpoints = EndpointTable::new(overrides);
        endpoints.validate()?;

        let token_dir = lookup(TOKEN_DIR_VAR)
            .or_else(|| config.token_dir.clone())
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_path(&value))
            .unwrap_or_else(|| config_directory().join(TOKEN_DIR_NAME));

        Ok(Self {
            base_url,
            endpoints,
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            chunk_size: config.chunk_size,
            poll: PollPolicy {
                interval: Duration::from_millis(config.polling.interval_ms),
                max_attempts: config.polling.max_attempts,
            },
            token_dir,
        })
    }

    /// Location of the persisted token pair for `identity`.
    pub fn token_path(&self, identity: Identity) -> PathBuf {
        self.token_dir.join(format!("{}.json", identity.as_str()))
    }
}

/// Parse the base URL, forcing a trailing slash so relative templates join below it.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized).map_err(|err| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

/// Expand `~` and environment references in user-supplied paths.
pub fn expand_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    match shellexpand::full(trimmed) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(trimmed).as_ref()),
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`, honouring `REVAPI_CONFIG`.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.trim().is_empty() => expand_path(&path),
        _ => config_directory().join(CONFIG_FILE_NAME),
    }
}

/// Load the configuration, falling back to defaults when absent or unreadable.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration to disk.
pub fn save_config(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (FileConfig::default(), warnings);
    }

    if config.chunk_size == 0 {
        warnings.push(format!(
            "chunk_size must be positive. Resetting to {DEFAULT_CHUNK_SIZE}."
        ));
        config.chunk_size = DEFAULT_CHUNK_SIZE;
    }

    if config.polling.max_attempts == 0 {
        warnings.push(format!(
            "polling.max_attempts must be positive. Resetting to {DEFAULT_POLL_MAX_ATTEMPTS}."
        ));
        config.polling.max_attempts = DEFAULT_POLL_MAX_ATTEMPTS;
    }

    let unknown: Vec<String> = config
        .endpoints
        .keys()
        .filter(|key| Endpoint::from_key(key).is_none())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        warnings.push(format!(
            "Ignoring unknown endpoint keys: {}",
            unknown.join(", ")
        ));
        config
            .endpoints
            .retain(|key, _| Endpoint::from_key(key).is_some());
    }

    if config.request_timeout_secs == 0 {
        warnings.push(format!(
            "request_timeout_secs must be positive. Resetting to {DEFAULT_REQUEST_TIMEOUT_SECS}."
        ));
        config.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
    }

    (config, warnings)
}
