//! Token lifecycle for one agent identity.
//!
//! [`Session::authenticate`] runs a strict validate → refresh → login chain.
//! Each stage fails with its own [`AuthError`]; those never leave this module,
//! only the boolean outcome (or a transport failure) does.

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ApiSettings, Credential, Identity};
use crate::endpoint::{Endpoint, EndpointTable, build_url};
use crate::error::RevApiError;
use crate::token_store::{TokenPair, TokenStore};
use crate::transport::{ApiRequest, Method, Transport, TransportError};

#[derive(Debug, Error)]
enum AuthError {
    #[error("login failed")]
    LoginFailed,
    #[error("token refresh failed")]
    RefreshFailed,
    #[error("token is expired")]
    TokenExpired,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Deserialize)]
struct TokenResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

pub struct Session<T> {
    credential: Credential,
    tokens: TokenPair,
    store: TokenStore,
    transport: T,
    base_url: Url,
    endpoints: EndpointTable,
}

impl<T: Transport> Session<T> {
    /// Build a session, loading any token pair previously stored for this username.
    pub fn new(
        settings: &ApiSettings,
        credential: Credential,
        store: TokenStore,
        transport: T,
    ) -> Result<Self, RevApiError> {
        let tokens = store.load_for(&credential.username)?;
        Ok(Self {
            credential,
            tokens,
            store,
            transport,
            base_url: settings.base_url.clone(),
            endpoints: settings.endpoints.clone(),
        })
    }

    pub fn identity(&self) -> Identity {
        self.credential.identity
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    /// Make sure a usable bearer token is held, refreshing or logging in as needed.
    ///
    /// Returns `Ok(false)` when every stage was rejected; transport failures
    /// abort the chain and are returned as errors.
    pub fn authenticate(&mut self) -> Result<bool, TransportError> {
        match self.run_chain() {
            Ok(()) => {
                debug!(identity = %self.identity(), "Authentication successful");
                Ok(true)
            }
            Err(AuthError::Transport(err)) => Err(err),
            Err(err) => {
                error!(identity = %self.identity(), reason = %err, "Authentication failed");
                Ok(false)
            }
        }
    }

    fn run_chain(&mut self) -> Result<(), AuthError> {
        match self.validate() {
            Ok(()) => return Ok(()),
            Err(AuthError::TokenExpired) => {}
            Err(other) => return Err(other),
        }
        match self.refresh() {
            Ok(()) => return Ok(()),
            Err(AuthError::RefreshFailed) => {}
            Err(other) => return Err(other),
        }
        self.login()
    }

    /// Any non-200 answer counts as an expired token, whatever the actual reason.
    fn validate(&mut self) -> Result<(), AuthError> {
        debug!("Validating token");
        let Some(url) = self.url(Endpoint::Validate) else {
            return Err(AuthError::TokenExpired);
        };
        let request = ApiRequest::new(Method::Get, url)
            .bearer(self.tokens.access_token.clone());
        let response = self.transport.execute(&request)?;
        if response.status != 200 {
            debug!(status = response.status, "Token rejected");
            return Err(AuthError::TokenExpired);
        }
        debug!("Token is valid");
        self.persist();
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), AuthError> {
        debug!("Refreshing token");
        let Some(url) = self.url(Endpoint::Refresh) else {
            return Err(AuthError::RefreshFailed);
        };
        let request = ApiRequest::new(Method::Post, url)
            .form([("refresh", self.tokens.refresh_token.as_str())]);
        let response = self.transport.execute(&request)?;
        if response.status != 200 {
            debug!(status = response.status, "Token refresh rejected");
            return Err(AuthError::RefreshFailed);
        }
        let tokens: TokenResponse = serde_json::from_str(&response.body).map_err(|err| {
            warn!(error = %err, "Refresh response did not contain tokens");
            AuthError::RefreshFailed
        })?;
        self.install(tokens);
        info!("Token refresh successful");
        Ok(())
    }

    fn login(&mut self) -> Result<(), AuthError> {
        debug!(username = %self.credential.username, "Logging in");
        let Some(url) = self.url(Endpoint::Login) else {
            return Err(AuthError::LoginFailed);
        };
        let request = ApiRequest::new(Method::Post, url).form([
            ("username", self.credential.username.as_str()),
            ("password", self.credential.password.as_str()),
        ]);
        let response = self.transport.execute(&request)?;
        if response.status != 200 {
            error!(status = response.status, body = %response.describe(), "Login rejected");
            return Err(AuthError::LoginFailed);
        }
        let tokens: TokenResponse = serde_json::from_str(&response.body).map_err(|err| {
            error!(error = %err, "Login response did not contain tokens");
            AuthError::LoginFailed
        })?;
        self.install(tokens);
        info!(username = %self.credential.username, "Login successful");
        Ok(())
    }

    /// A response without a new refresh token keeps the current one.
    fn install(&mut self, tokens: TokenResponse) {
        let refresh_token = tokens
            .refresh
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.tokens.refresh_token.clone());
        self.tokens = TokenPair::new(
            self.credential.username.clone(),
            tokens.access,
            refresh_token,
        );
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.tokens) {
            warn!(error = %err, "Failed to persist tokens; continuing with in-memory tokens");
        }
    }

    /// Auth endpoints take no parameters; an override that adds one fails
    /// its stage without a request.
    fn url(&self, endpoint: Endpoint) -> Option<Url> {
        build_url(&self.base_url, self.endpoints.template(endpoint), &[], None)
            .map_err(|err| error!(endpoint = %endpoint, error = %err, "Cannot build auth URL"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, settings_for};
    use crate::transport::{ApiResponse, RequestBody};
    use tempfile::tempdir;

    fn session<'a>(
        transport: &'a ScriptedTransport,
        store: TokenStore,
    ) -> Session<&'a ScriptedTransport> {
        let settings = settings_for("https://rev.example.com/");
        let credential = Credential::new(Identity::User, "alice", "pw");
        Session::new(&settings, credential, store, transport).unwrap()
    }

    #[test]
    fn valid_token_takes_one_call() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user.json"));
        store.save(&TokenPair::new("alice", "acc", "ref")).unwrap();
        let transport = ScriptedTransport::new([ApiResponse::new(200, "{}")]);
        let mut session = session(&transport, store);

        assert!(session.authenticate().unwrap());
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].url.path().ends_with("api/auth/validate/"));
        assert_eq!(calls[0].bearer.as_deref(), Some("acc"));
    }

    #[test]
    fn refresh_installs_and_persists_new_pair() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user.json"));
        store.save(&TokenPair::new("alice", "old", "ref")).unwrap();
        let transport = ScriptedTransport::new([
            ApiResponse::new(401, r#"{"detail": "expired"}"#),
            ApiResponse::new(200, r#"{"access": "new-acc", "refresh": "new-ref"}"#),
        ]);
        let mut session = session(&transport, store.clone());

        assert!(session.authenticate().unwrap());
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].body,
            RequestBody::Form(vec![("refresh".to_string(), "ref".to_string())])
        );
        let expected = TokenPair::new("alice", "new-acc", "new-ref");
        assert_eq!(session.tokens(), &expected);
        assert_eq!(store.load_for("alice").unwrap(), expected);
    }

    #[test]
    fn refresh_without_rotation_keeps_refresh_token() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user.json"));
        store.save(&TokenPair::new("alice", "old", "ref")).unwrap();
        let transport = ScriptedTransport::new([
            ApiResponse::new(401, ""),
            ApiResponse::new(200, r#"{"access": "new-acc"}"#),
        ]);
        let mut session = session(&transport, store);
        assert!(session.authenticate().unwrap());
        assert_eq!(session.tokens().refresh_token, "ref");
    }

    #[test]
    fn unrenderable_auth_url_skips_that_stage() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user.json"));
        store.save(&TokenPair::new("alice", "old", "ref")).unwrap();
        let transport = ScriptedTransport::new([ApiResponse::new(
            200,
            r#"{"access": "new-acc", "refresh": "new-ref"}"#,
        )]);
        let mut settings = settings_for("https://rev.example.com/");
        settings.endpoints = EndpointTable::new(
            [(Endpoint::Validate, "api/auth/{user}/validate/".to_string())].into(),
        );
        let credential = Credential::new(Identity::User, "alice", "pw");
        let mut session = Session::new(&settings, credential, store, &transport).unwrap();

        assert!(session.authenticate().unwrap());
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url.path(), "/api/auth/refresh/");
    }

    #[test]
    fn login_is_last_resort() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user.json"));
        let transport = ScriptedTransport::new([
            ApiResponse::new(401, ""),
            ApiResponse::new(401, ""),
            ApiResponse::new(200, r#"{"access": "a1", "refresh": "r1"}"#),
        ]);
        let mut session = session(&transport, store.clone());

        assert!(session.authenticate().unwrap());
        let paths: Vec<String> = transport
            .calls()
            .iter()
            .map(|call| call.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["/api/auth/validate/", "/api/auth/refresh/", "/api/auth/login/"]
        );
        assert_eq!(
            store.load_for("alice").unwrap(),
            TokenPair::new("alice", "a1", "r1")
        );
    }

    #[test]
    fn all_stages_failing_returns_false_without_persisting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");
        let transport = ScriptedTransport::new([
            ApiResponse::new(401, ""),
            ApiResponse::new(401, ""),
            ApiResponse::new(400, r#"{"detail": "bad credentials"}"#),
        ]);
        let mut session = session(&transport, TokenStore::new(&path));

        assert!(!session.authenticate().unwrap());
        assert_eq!(transport.calls().len(), 3);
        assert!(!path.exists());
    }

    #[test]
    fn transport_failure_aborts_the_chain() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::failing();
        let mut session = session(&transport, TokenStore::new(dir.path().join("user.json")));
        assert!(session.authenticate().is_err());
        assert_eq!(transport.calls().len(), 1);
    }
}
