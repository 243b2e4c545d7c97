use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::time::Duration;

use revapi_cli::{InvocationOptions, Middleware};
use revapi_core::config::FileConfig;
use revapi_core::forms::Prompter;
use revapi_core::transport::RequestBody;
use revapi_core::{
    ApiRequest, ApiResponse, ApiSettings, Credential, Identity, Method, Operation,
    Query, RevApiError, RevClient, Session, TokenPair, TokenStore, Transport, TransportError,
};
use serde_json::json;
use tempfile::{TempDir, tempdir};

struct Server {
    responses: RefCell<VecDeque<Result<ApiResponse, ()>>>,
    requests: RefCell<Vec<ApiRequest>>,
}

impl Server {
    fn new(responses: Vec<(u16, &str)>) -> Self {
        Self {
            responses: RefCell::new(
                responses
                    .into_iter()
                    .map(|(status, body)| Ok(ApiResponse::new(status, body)))
                    .collect(),
            ),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn unreachable_host() -> Self {
        Self {
            responses: RefCell::new(VecDeque::from([Err(())])),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn paths(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }
}

impl Transport for Server {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            _ => {
                let source = reqwest::blocking::Client::new()
                    .get("http://127.0.0.1:9/")
                    .timeout(Duration::from_millis(200))
                    .send()
                    .expect_err("nothing listens on the discard port");
                Err(TransportError::Request {
                    method: request.method,
                    url: request.url.to_string(),
                    source,
                })
            }
        }
    }
}

#[derive(Default)]
struct Script {
    answers: VecDeque<String>,
    notices: Vec<String>,
}

impl Script {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            notices: Vec::new(),
        }
    }
}

impl Prompter for Script {
    fn ask(&mut self, _label: &str) -> io::Result<String> {
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }

    fn ask_secret(&mut self, label: &str) -> io::Result<String> {
        self.ask(label)
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

fn client<'a>(server: &'a Server, identity: Identity) -> (RevClient<&'a Server>, TempDir) {
    let dir = tempdir().unwrap();
    let config = FileConfig {
        base_url: Some("https://rev.example.com/".to_string()),
        token_dir: Some(dir.path().display().to_string()),
        ..FileConfig::default()
    };
    let settings = ApiSettings::resolve(&config, |_| None).unwrap();
    let store = TokenStore::new(settings.token_path(identity));
    store.save(&TokenPair::new("ops", "acc", "ref")).unwrap();
    let session = Session::new(&settings, Credential::new(identity, "ops", "pw"), store, server)
        .unwrap();
    (RevClient::new(session, &settings), dir)
}

#[test]
fn id_and_query_flags_skip_prompts() {
    let server = Server::new(vec![(200, r#"[{"hper": 0.98}]"#)]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::default();
    let options = InvocationOptions {
        id: Some(7),
        query: Some(Query::parse("?date=2024-03-01")),
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::GetHper)
        .unwrap();

    let requests = server.requests.borrow();
    assert_eq!(requests[0].url.path(), "/api/plants/7/hper/");
    assert_eq!(requests[0].url.query(), Some("date=2024-03-01"));
    assert_eq!(requests[0].bearer.as_deref(), Some("acc"));
}

#[test]
fn missing_values_are_prompted_until_valid() {
    let server = Server::new(vec![(200, "[]")]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::new(&["seven", "7", "2024-01-01", "01/31/2024", "2024-01-31"]);
    let options = InvocationOptions {
        range: true,
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::GetGenMeasurements)
        .unwrap();

    assert_eq!(script.notices.len(), 2);
    let requests = server.requests.borrow();
    assert_eq!(requests[0].url.path(), "/api/plants/7/measurements/gen/");
    assert_eq!(
        requests[0].url.query(),
        Some("start_date=2024-01-01&end_date=2024-01-31")
    );
}

#[test]
fn uploads_read_the_data_file_in_chunks() {
    let server = Server::new(vec![(201, "{}")]);
    let (client, dir) = client(&server, Identity::User);
    let path = dir.path().join("gen.json");
    fs::write(
        &path,
        json!([{"timestamp": "2024-01-01 00:00:00", "act_energy": 1.5}]).to_string(),
    )
    .unwrap();
    let mut script = Script::default();
    let options = InvocationOptions {
        id: Some(3),
        file: Some(path),
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::PostGenMeasurements)
        .unwrap();

    let requests = server.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(
        requests[0].body,
        RequestBody::Json(json!([{"timestamp": "2024-01-01 00:00:00", "act_energy": 1.5}]))
    );
}

#[test]
fn aborting_file_selection_sends_nothing() {
    let server = Server::new(vec![]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::new(&["/no/such/file.json", "maybe", "y"]);
    let options = InvocationOptions {
        id: Some(3),
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::UpdateWeatherMeasurements)
        .unwrap();

    assert!(server.requests.borrow().is_empty());
    assert_eq!(script.notices, vec!["Operation aborted".to_string()]);
}

#[test]
fn incident_table_is_prompted_when_missing() {
    let server = Server::new(vec![(201, r#"{"created": 1}"#)]);
    let (client, dir) = client(&server, Identity::User);
    let path = dir.path().join("incidents.json");
    fs::write(&path, r#"[{"start": "2024-01-01", "kind": "trip"}]"#).unwrap();
    let mut script = Script::new(&["solar", "gen"]);
    let options = InvocationOptions {
        id: Some(5),
        file: Some(path),
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::PostIncidents)
        .unwrap();

    assert_eq!(script.notices, vec!["Invalid table".to_string()]);
    assert_eq!(server.paths(), vec!["/api/plants/5/incidents/gen/"]);
}

#[test]
fn portfolio_update_prompts_for_id_then_form() {
    let server = Server::new(vec![(200, r#"{"id": 9}"#)]);
    let (client, _dir) = client(&server, Identity::Admin);
    let mut script = Script::new(&["9", "North Fleet", "NorthFleet", "Chile"]);

    Middleware::new(&client, &mut script, InvocationOptions::default())
        .run(Operation::UpdatePortfolio)
        .unwrap();

    let requests = server.requests.borrow();
    assert_eq!(requests[0].method, Method::Put);
    assert_eq!(requests[0].url.path(), "/api/admin/portfolios/9/");
    assert_eq!(
        requests[0].body,
        RequestBody::Json(json!({"id": 9, "name": "NorthFleet", "country": "Chile"}))
    );
}

#[test]
fn detailed_flag_reaches_listing_query() {
    let server = Server::new(vec![(200, "[]")]);
    let (client, _dir) = client(&server, Identity::Admin);
    let mut script = Script::default();
    let options = InvocationOptions {
        detailed: true,
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::ListPlants)
        .unwrap();

    assert_eq!(
        server.requests.borrow()[0].url.query(),
        Some("detailed=True")
    );
}

#[test]
fn task_operations_poll_until_done() {
    let server = Server::new(vec![
        (200, r#"{"task_id": "t-1"}"#),
        (202, r#"{"status": "pending"}"#),
        (201, r#"{"status": "success", "rows": 24}"#),
    ]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::default();
    let options = InvocationOptions {
        id: Some(2),
        query: Some(Query::parse("date=2024-05-05")),
        ..InvocationOptions::default()
    };

    Middleware::new(&client, &mut script, options)
        .run(Operation::GenerateDailyMetrics)
        .unwrap();

    assert_eq!(
        server.paths(),
        vec![
            "/api/plants/2/metrics/generate/",
            "/api/plants/2/metrics/generate/result/",
            "/api/plants/2/metrics/generate/result/",
        ]
    );
}

#[test]
fn server_errors_are_reported_but_not_fatal() {
    let server = Server::new(vec![(500, "boom")]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::default();
    let options = InvocationOptions {
        id: Some(1),
        ..InvocationOptions::default()
    };

    let result = Middleware::new(&client, &mut script, options).run(Operation::PlantDetail);
    assert!(result.is_ok());
}

#[test]
fn connection_errors_abort_the_invocation() {
    let server = Server::unreachable_host();
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::default();

    let result = Middleware::new(&client, &mut script, InvocationOptions::default())
        .run(Operation::GetUserPlantsAccess);
    assert!(matches!(result, Err(RevApiError::Connection(_))));
}

#[test]
fn admin_calls_from_user_identity_are_refused_without_requests() {
    let server = Server::new(vec![]);
    let (client, _dir) = client(&server, Identity::User);
    let mut script = Script::default();

    Middleware::new(&client, &mut script, InvocationOptions::default())
        .run(Operation::UserList)
        .unwrap();

    assert!(server.requests.borrow().is_empty());
}
