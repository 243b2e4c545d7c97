use std::cell::RefCell;
use std::collections::VecDeque;

use revapi_core::config::{ApiSettings, FileConfig};
use revapi_core::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Replays canned responses in order and records each request.
pub struct FakeServer {
    responses: RefCell<VecDeque<ApiResponse>>,
    pub requests: RefCell<Vec<ApiRequest>>,
}

impl FakeServer {
    pub fn new(responses: Vec<(u16, &str)>) -> Self {
        Self {
            responses: RefCell::new(
                responses
                    .into_iter()
                    .map(|(status, body)| ApiResponse::new(status, body))
                    .collect(),
            ),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }
}

impl Transport for FakeServer {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .expect("unexpected extra request"))
    }
}

pub fn settings(token_dir: &std::path::Path) -> ApiSettings {
    let config = FileConfig {
        base_url: Some("https://rev.example.com/rev".to_string()),
        token_dir: Some(token_dir.display().to_string()),
        ..FileConfig::default()
    };
    ApiSettings::resolve(&config, |_| None).expect("settings resolve")
}
