use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Bearer/refresh tokens together with the username they were issued to.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |token: &str| if token.is_empty() { "<empty>" } else { "<set>" };
        f.debug_struct("TokenPair")
            .field("username", &self.username)
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &mask(&self.refresh_token))
            .finish()
    }
}

impl TokenPair {
    pub fn new(
        username: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn empty_for(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.refresh_token.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// JSON file holding the token pair of a single identity.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored pair if it belongs to `username`; otherwise an empty pair.
    ///
    /// A missing or unparsable file is not an error: the session simply starts
    /// without tokens and logs in.
    pub fn load_for(&self, username: &str) -> Result<TokenPair, TokenStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored tokens");
                return Ok(TokenPair::empty_for(username));
            }
            Err(source) => {
                return Err(TokenStoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let stored: TokenPair = match serde_json::from_str(&raw) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Stored tokens are unreadable; ignoring them"
                );
                return Ok(TokenPair::empty_for(username));
            }
        };

        if stored.username != username {
            debug!(
                stored = %stored.username,
                active = %username,
                "Stored tokens belong to another user; ignoring them"
            );
            return Ok(TokenPair::empty_for(username));
        }

        Ok(stored)
    }

    /// Write `pair` atomically (temp file + rename), owner-only on unix.
    pub fn save(&self, pair: &TokenPair) -> Result<(), TokenStoreError> {
        let io_err = |source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let encoded = serde_json::to_string_pretty(pair)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(encoded.as_bytes()).map_err(io_err)?;
            file.write_all(b"\n").map_err(io_err)?;
        }
        if let Err(err) = restrict_permissions(&tmp) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "Could not restrict token file permissions"
            );
        }
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), "Persisted tokens");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
