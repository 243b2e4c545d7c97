use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::{ApiSettings, FileConfig};
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Transport replaying canned responses and recording every request.
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<ApiResponse>>,
    calls: RefCell<Vec<ApiRequest>>,
    fail: bool,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = ApiResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            calls: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    /// Every request fails as if the server were unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new([])
        }
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.borrow_mut().push(request.clone());
        if self.fail {
            return Err(unreachable_server(request));
        }
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ApiResponse::new(599, "no scripted response left")))
    }
}

/// Produce a genuine `reqwest` connection error against a closed local port.
fn unreachable_server(request: &ApiRequest) -> TransportError {
    let source = match reqwest::blocking::Client::new()
        .get("http://127.0.0.1:9/")
        .timeout(std::time::Duration::from_millis(200))
        .send()
    {
        Err(err) => err,
        Ok(_) => panic!("port 9 unexpectedly accepted a connection"),
    };
    TransportError::Request {
        method: request.method,
        url: request.url.to_string(),
        source,
    }
}

pub fn settings_for(base_url: &str) -> ApiSettings {
    let config = FileConfig {
        base_url: Some(base_url.to_string()),
        ..FileConfig::default()
    };
    ApiSettings::resolve(&config, |_| None).unwrap()
}
