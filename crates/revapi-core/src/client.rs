//! Typed wrappers over every Rev API resource.
//!
//! Each call returns `Ok(None)` when the server answered with a status that the
//! operation does not treat as success; the error body is logged. Transport
//! failures are returned as [`RevApiError::Connection`].

use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{ApiSettings, Identity};
use crate::endpoint::{Endpoint, Query, build_url};
use crate::error::RevApiError;
use crate::operation::Operation;
use crate::session::Session;
use crate::tasks::{PollPolicy, Submission, TaskKind, TaskOutcome, poll_until_terminal};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use crate::upload::{UploadOutcome, upload_in_chunks};

/// Incident table an incident list is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentTable {
    Gen,
    Weather,
}

impl IncidentTable {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentTable::Gen => "gen",
            IncidentTable::Weather => "weather",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "gen" => Some(IncidentTable::Gen),
            "weather" => Some(IncidentTable::Weather),
            _ => None,
        }
    }
}

/// How a response status maps onto `Some`/`None`.
#[derive(Debug, Clone, Copy)]
enum Expect {
    /// 200 only.
    Read,
    /// 201 only; a 400 body is logged as a validation error.
    Created,
    /// 200 only; any other body is logged.
    Updated,
    /// Task results: 201 (and 200 when allowed), plus bodies of 400/404/500/202.
    TaskResult { accept_ok: bool },
}

pub struct RevClient<T> {
    session: Session<T>,
    chunk_size: usize,
    poll: PollPolicy,
}

impl<T: Transport> RevClient<T> {
    pub fn new(session: Session<T>, settings: &ApiSettings) -> Self {
        Self {
            session,
            chunk_size: settings.chunk_size,
            poll: settings.poll,
        }
    }

    pub fn identity(&self) -> Identity {
        self.session.identity()
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    /// Run the validate/refresh/login chain; `AuthenticationFailed` when every stage was rejected.
    pub fn authenticate(&mut self) -> Result<(), RevApiError> {
        if self.session.authenticate()? {
            Ok(())
        } else {
            Err(RevApiError::AuthenticationFailed)
        }
    }

    fn url(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
        query: Option<&Query>,
    ) -> Result<reqwest::Url, RevApiError> {
        let template = self.session.endpoints().template(endpoint);
        Ok(build_url(self.session.base_url(), template, params, query)?)
    }

    fn send(&self, request: ApiRequest) -> Result<ApiResponse, RevApiError> {
        let request = request.bearer(self.session.access_token());
        debug!(method = %request.method, url = %request.url, "Sending request");
        Ok(self.session.transport().execute(&request)?)
    }

    fn call(
        &self,
        endpoint: Endpoint,
        method: Method,
        params: &[(&str, &str)],
        query: Option<&Query>,
        body: Option<&Value>,
        expect: Expect,
    ) -> Result<Option<Value>, RevApiError> {
        let mut request = ApiRequest::new(method, self.url(endpoint, params, query)?);
        if let Some(body) = body {
            request = request.json(body.clone());
        }
        let response = self.send(request)?;
        interpret(endpoint, &response, expect)
    }

    fn get(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
        query: Option<&Query>,
    ) -> Result<Option<Value>, RevApiError> {
        self.call(endpoint, Method::Get, params, query, None, Expect::Read)
    }

    fn require(&self, operation: Operation) -> Result<(), RevApiError> {
        operation.check_permission(self.identity())
    }

    pub fn plant_detail(&self, plant: u64) -> Result<Option<Value>, RevApiError> {
        let plant = plant.to_string();
        self.get(Endpoint::PlantDetail, &[("plant", plant.as_str())], None)
    }

    pub fn portfolio_detail(&self, portfolio: u64) -> Result<Option<Value>, RevApiError> {
        let portfolio = portfolio.to_string();
        self.get(Endpoint::PortfolioDetail, &[("portfolio", portfolio.as_str())], None)
    }

    pub fn get_user_plants_access(&self) -> Result<Option<Value>, RevApiError> {
        self.get(Endpoint::UserPlantsAccess, &[], None)
    }

    pub fn get_user_portfolios_access(&self, detailed: bool) -> Result<Option<Value>, RevApiError> {
        self.get(
            Endpoint::UserPortfoliosAccess,
            &[],
            Some(&Query::detailed(detailed)),
        )
    }

    pub fn get_portfolio_plants(
        &self,
        portfolio: u64,
        detailed: bool,
    ) -> Result<Option<Value>, RevApiError> {
        let portfolio = portfolio.to_string();
        self.get(
            Endpoint::PortfolioPlants,
            &[("portfolio", portfolio.as_str())],
            Some(&Query::detailed(detailed)),
        )
    }

    pub fn get_gen_measurements(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetGenMeasurements, plant, query)
    }

    pub fn get_weather_measurements(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetWeatherMeasurements, plant, query)
    }

    pub fn get_incidents(&self, plant: u64, query: &Query) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetIncidents, plant, query)
    }

    pub fn get_hper(&self, plant: u64, query: &Query) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetHper, plant, query)
    }

    pub fn get_daily_availability(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetDailyAvailability, plant, query)
    }

    pub fn get_daily_metrics(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.plant_query(Endpoint::GetDailyMetrics, plant, query)
    }

    fn plant_query(
        &self,
        endpoint: Endpoint,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        let plant = plant.to_string();
        self.get(endpoint, &[("plant", plant.as_str())], Some(query))
    }

    pub fn post_gen_measurements(
        &self,
        plant: u64,
        records: &[Value],
    ) -> Result<UploadOutcome, RevApiError> {
        self.upload(Endpoint::PostGenMeasurements, "Gen", plant, records)
    }

    pub fn post_weather_measurements(
        &self,
        plant: u64,
        records: &[Value],
    ) -> Result<UploadOutcome, RevApiError> {
        self.upload(Endpoint::PostWeatherMeasurements, "Weather", plant, records)
    }

    pub fn post_prmt_measurements(
        &self,
        plant: u64,
        records: &[Value],
    ) -> Result<UploadOutcome, RevApiError> {
        self.require(Operation::PostPrmtMeasurements)?;
        self.upload(Endpoint::PostPrmtMeasurements, "PRMT", plant, records)
    }

    fn upload(
        &self,
        endpoint: Endpoint,
        label: &str,
        plant: u64,
        records: &[Value],
    ) -> Result<UploadOutcome, RevApiError> {
        let plant = plant.to_string();
        let url = self.url(endpoint, &[("plant", plant.as_str())], None)?;
        upload_in_chunks(label, records, self.chunk_size, |chunk| {
            let request =
                ApiRequest::new(Method::Post, url.clone()).json(Value::Array(chunk.to_vec()));
            self.send(request)
        })
    }

    pub fn update_gen_measurements(
        &self,
        plant: u64,
        data: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        let plant = plant.to_string();
        self.call(
            Endpoint::UpdateGenMeasurements,
            Method::Post,
            &[("plant", plant.as_str())],
            None,
            Some(data),
            Expect::Updated,
        )
    }

    pub fn update_weather_measurements(
        &self,
        plant: u64,
        data: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        let plant = plant.to_string();
        self.call(
            Endpoint::UpdateWeatherMeasurements,
            Method::Post,
            &[("plant", plant.as_str())],
            None,
            Some(data),
            Expect::Updated,
        )
    }

    pub fn post_incidents(
        &self,
        plant: u64,
        table: IncidentTable,
        data: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        let plant = plant.to_string();
        self.call(
            Endpoint::PostIncidents,
            Method::Post,
            &[("plant", plant.as_str()), ("table", table.as_str())],
            None,
            Some(data),
            Expect::Created,
        )
    }

    /// Submit a task; the body carries either `task_id` or `message`.
    pub fn submit_task(
        &self,
        kind: TaskKind,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.plant_query(kind.submit_endpoint(), plant, query)
    }

    pub fn task_result(
        &self,
        kind: TaskKind,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        let endpoint = kind.result_endpoint();
        let plant = plant.to_string();
        let url = self.url(endpoint, &[("plant", plant.as_str())], None)?;
        let request = ApiRequest::new(Method::Post, url).form([("task_id", task_id)]);
        let response = self.send(request)?;
        interpret(
            endpoint,
            &response,
            Expect::TaskResult {
                accept_ok: kind.accepts_ok_result(),
            },
        )
    }

    pub fn generate_hper(&self, plant: u64, query: &Query) -> Result<Option<Value>, RevApiError> {
        self.submit_task(TaskKind::Hper, plant, query)
    }

    pub fn generate_hper_result(
        &self,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        self.task_result(TaskKind::Hper, plant, task_id)
    }

    pub fn generate_daily_availability(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.submit_task(TaskKind::DailyAvailability, plant, query)
    }

    pub fn generate_daily_availability_result(
        &self,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        self.task_result(TaskKind::DailyAvailability, plant, task_id)
    }

    pub fn generate_daily_metrics(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.submit_task(TaskKind::DailyMetrics, plant, query)
    }

    pub fn generate_daily_metrics_result(
        &self,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        self.task_result(TaskKind::DailyMetrics, plant, task_id)
    }

    pub fn calculate_data(&self, plant: u64, query: &Query) -> Result<Option<Value>, RevApiError> {
        self.submit_task(TaskKind::CalculateData, plant, query)
    }

    pub fn calculate_data_result(
        &self,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        self.task_result(TaskKind::CalculateData, plant, task_id)
    }

    pub fn recalculate_data(
        &self,
        plant: u64,
        query: &Query,
    ) -> Result<Option<Value>, RevApiError> {
        self.submit_task(TaskKind::RecalculateData, plant, query)
    }

    pub fn recalculate_data_result(
        &self,
        plant: u64,
        task_id: &str,
    ) -> Result<Option<Value>, RevApiError> {
        self.task_result(TaskKind::RecalculateData, plant, task_id)
    }

    /// Submit a task and poll it to a terminal state, sleeping on the current thread.
    pub fn run_task(
        &self,
        kind: TaskKind,
        plant: u64,
        query: &Query,
    ) -> Result<TaskOutcome, RevApiError> {
        self.run_task_with_sleep(kind, plant, query, thread::sleep)
    }

    pub fn run_task_with_sleep<S>(
        &self,
        kind: TaskKind,
        plant: u64,
        query: &Query,
        sleep: S,
    ) -> Result<TaskOutcome, RevApiError>
    where
        S: FnMut(Duration),
    {
        let Some(body) = self.submit_task(kind, plant, query)? else {
            return Ok(TaskOutcome::NotScheduled);
        };
        match Submission::parse(&body) {
            Submission::AlreadyCurrent { message } => Ok(TaskOutcome::AlreadyCurrent { message }),
            Submission::MissingTaskId { body } => Ok(TaskOutcome::MissingTaskId { body }),
            Submission::Scheduled { task_id } => {
                debug!(task_id = %task_id, body = %body, "Task scheduled successfully");
                poll_until_terminal(
                    &task_id,
                    &self.poll,
                    |task_id| self.task_result(kind, plant, task_id),
                    sleep,
                )
            }
        }
    }

    pub fn create_profile(&self, profile: &Value) -> Result<Option<Value>, RevApiError> {
        self.admin_write(
            Operation::CreateProfile,
            Endpoint::CreateProfile,
            Method::Post,
            &[],
            profile,
        )
    }

    pub fn profile_list(&self) -> Result<Option<Value>, RevApiError> {
        self.require(Operation::ProfileList)?;
        self.get(Endpoint::ProfileList, &[], None)
    }

    pub fn user_list(&self) -> Result<Option<Value>, RevApiError> {
        self.require(Operation::UserList)?;
        self.get(Endpoint::UserList, &[], None)
    }

    pub fn update_profile(
        &self,
        profile_id: u64,
        profile: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        let id = profile_id.to_string();
        self.admin_write(
            Operation::UpdateProfile,
            Endpoint::UpdateProfile,
            Method::Put,
            &[("profile", id.as_str())],
            profile,
        )
    }

    pub fn create_portfolio(&self, portfolio: &Value) -> Result<Option<Value>, RevApiError> {
        self.admin_write(
            Operation::CreatePortfolio,
            Endpoint::CreatePortfolio,
            Method::Post,
            &[],
            portfolio,
        )
    }

    pub fn portfolio_list(&self) -> Result<Option<Value>, RevApiError> {
        self.require(Operation::PortfolioList)?;
        self.get(Endpoint::PortfolioList, &[], None)
    }

    pub fn update_portfolio(
        &self,
        portfolio_id: u64,
        portfolio: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        let id = portfolio_id.to_string();
        self.admin_write(
            Operation::UpdatePortfolio,
            Endpoint::UpdatePortfolio,
            Method::Put,
            &[("portfolio", id.as_str())],
            portfolio,
        )
    }

    pub fn create_plant(&self, plant: &Value) -> Result<Option<Value>, RevApiError> {
        self.admin_write(Operation::CreatePlant, Endpoint::CreatePlant, Method::Post, &[], plant)
    }

    pub fn list_plants(&self, detailed: bool) -> Result<Option<Value>, RevApiError> {
        self.require(Operation::ListPlants)?;
        self.get(Endpoint::ListPlants, &[], Some(&Query::detailed(detailed)))
    }

    pub fn update_plant(&self, plant_id: u64, plant: &Value) -> Result<Option<Value>, RevApiError> {
        let id = plant_id.to_string();
        self.admin_write(
            Operation::UpdatePlant,
            Endpoint::UpdatePlant,
            Method::Put,
            &[("plant", id.as_str())],
            plant,
        )
    }

    fn admin_write(
        &self,
        operation: Operation,
        endpoint: Endpoint,
        method: Method,
        params: &[(&str, &str)],
        body: &Value,
    ) -> Result<Option<Value>, RevApiError> {
        self.require(operation)?;
        let expect = match method {
            Method::Put => Expect::Updated,
            _ => Expect::Created,
        };
        self.call(endpoint, method, params, None, Some(body), expect)
    }
}

fn interpret(
    endpoint: Endpoint,
    response: &ApiResponse,
    expect: Expect,
) -> Result<Option<Value>, RevApiError> {
    let status = response.status;
    let accepted = match expect {
        Expect::Read | Expect::Updated => status == 200,
        Expect::Created => status == 201,
        Expect::TaskResult { accept_ok } => {
            status == 201 || (accept_ok && status == 200) || matches!(status, 400 | 404 | 500 | 202)
        }
    };
    if accepted {
        let body = match (response.json(), expect) {
            (Ok(body), _) => body,
            // A result page that is not JSON has no status; the poller ends on it.
            (Err(err), Expect::TaskResult { .. }) => {
                warn!(endpoint = %endpoint, status, "Undecodable task result: {err}");
                Value::String(response.body.clone())
            }
            (Err(err), _) => return Err(err.into()),
        };
        debug!(endpoint = %endpoint, status, body = %body, "Response");
        return Ok(Some(body));
    }
    match expect {
        Expect::Created if status == 400 => {
            error!(endpoint = %endpoint, "Request rejected: {}", response.describe())
        }
        Expect::Created | Expect::TaskResult { .. } => {
            warn!(endpoint = %endpoint, status, "Unexpected response status")
        }
        Expect::Read | Expect::Updated => {
            error!(endpoint = %endpoint, status, "Request failed: {}", response.describe())
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::test_support::{ScriptedTransport, settings_for};
    use crate::token_store::{TokenPair, TokenStore};
    use crate::transport::RequestBody;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn client<'a>(
        transport: &'a ScriptedTransport,
        identity: Identity,
    ) -> (RevClient<&'a ScriptedTransport>, TempDir) {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&TokenPair::new("ops", "acc", "ref")).unwrap();
        let mut settings = settings_for("https://rev.example.com/");
        settings.chunk_size = 2;
        let credential = Credential::new(identity, "ops", "pw");
        let session = Session::new(&settings, credential, store, transport).unwrap();
        (RevClient::new(session, &settings), dir)
    }

    #[test]
    fn reads_return_body_on_200_and_none_otherwise() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(200, r#"{"id": 4, "name": "Margarita"}"#),
            ApiResponse::new(404, r#"{"detail": "Not found."}"#),
        ]);
        let (client, _dir) = client(&transport, Identity::User);
        assert_eq!(
            client.plant_detail(4).unwrap(),
            Some(json!({"id": 4, "name": "Margarita"}))
        );
        assert_eq!(client.plant_detail(5).unwrap(), None);
        let calls = transport.calls();
        assert_eq!(calls[0].url.path(), "/api/plants/4/");
        assert_eq!(calls[0].bearer.as_deref(), Some("acc"));
    }

    #[test]
    fn detailed_flag_is_sent_as_query() {
        let transport = ScriptedTransport::new([ApiResponse::new(200, "[]")]);
        let (client, _dir) = client(&transport, Identity::User);
        client.get_portfolio_plants(3, true).unwrap();
        assert_eq!(
            transport.calls()[0].url.as_str(),
            "https://rev.example.com/api/portfolios/3/plants/?detailed=True"
        );
    }

    #[test]
    fn create_maps_201_and_400() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(201, r#"{"id": 1}"#),
            ApiResponse::new(400, r#"{"name": ["exists"]}"#),
        ]);
        let (client, _dir) = client(&transport, Identity::Admin);
        assert!(client.create_portfolio(&json!({"name": "N"})).unwrap().is_some());
        assert!(client.create_portfolio(&json!({"name": "N"})).unwrap().is_none());
        assert_eq!(transport.calls()[0].body, RequestBody::Json(json!({"name": "N"})));
    }

    #[test]
    fn admin_operations_are_gated_before_any_request() {
        let transport = ScriptedTransport::new([]);
        let (client, _dir) = client(&transport, Identity::User);
        let err = client.list_plants(false).unwrap_err();
        assert!(matches!(err, RevApiError::PermissionDenied(Operation::ListPlants)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn updates_use_put_with_id_in_path() {
        let transport = ScriptedTransport::new([ApiResponse::new(200, r#"{"id": 9}"#)]);
        let (client, _dir) = client(&transport, Identity::Admin);
        client.update_profile(9, &json!({"id": 9})).unwrap();
        let call = &transport.calls()[0];
        assert_eq!(call.method, Method::Put);
        assert_eq!(call.url.path(), "/api/admin/profiles/9/");
    }

    #[test]
    fn incidents_are_posted_to_table() {
        let transport = ScriptedTransport::new([ApiResponse::new(201, "[]")]);
        let (client, _dir) = client(&transport, Identity::User);
        let posted = client
            .post_incidents(8, IncidentTable::Weather, &json!([]))
            .unwrap();
        assert_eq!(posted, Some(json!([])));
        assert_eq!(
            transport.calls()[0].url.path(),
            "/api/plants/8/incidents/weather/"
        );
    }

    #[test]
    fn uploads_use_configured_chunk_size() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(201, "{}"),
            ApiResponse::new(201, "{}"),
            ApiResponse::new(201, "{}"),
        ]);
        let (client, _dir) = client(&transport, Identity::User);
        let records: Vec<Value> = (0..5).map(|i| json!({"i": i})).collect();
        let outcome = client.post_gen_measurements(2, &records).unwrap();
        assert_eq!(outcome, UploadOutcome::Completed { chunks: 3 });
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].body, RequestBody::Json(json!([{"i": 4}])));
    }

    #[test]
    fn task_runs_until_success() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(200, r#"{"task_id": "abc"}"#),
            ApiResponse::new(202, r#"{"status": "pending"}"#),
            ApiResponse::new(202, r#"{"status": "pending"}"#),
            ApiResponse::new(201, r#"{"status": "success", "result": 1}"#),
        ]);
        let (client, _dir) = client(&transport, Identity::User);
        let mut sleeps = 0;
        let outcome = client
            .run_task_with_sleep(
                TaskKind::Hper,
                3,
                &Query::new().with("date", "2024-05-01"),
                |_| sleeps += 1,
            )
            .unwrap();
        assert_eq!(sleeps, 2);
        assert!(matches!(outcome, TaskOutcome::Succeeded { ref task_id, .. } if task_id == "abc"));
        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0].url.as_str(),
            "https://rev.example.com/api/plants/3/hper/generate/?date=2024-05-01"
        );
        assert_eq!(
            calls[1].body,
            RequestBody::Form(vec![("task_id".to_string(), "abc".to_string())])
        );
    }

    #[test]
    fn already_current_submission_skips_polling() {
        let transport =
            ScriptedTransport::new([ApiResponse::new(200, r#"{"message": "already current"}"#)]);
        let (client, _dir) = client(&transport, Identity::User);
        let outcome = client
            .run_task_with_sleep(TaskKind::DailyMetrics, 3, &Query::new(), |_| {})
            .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::AlreadyCurrent {
                message: "already current".to_string()
            }
        );
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn calculation_results_accept_200() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(200, r#"{"status": "success"}"#),
            ApiResponse::new(200, r#"{"status": "success"}"#),
        ]);
        let (client, _dir) = client(&transport, Identity::User);
        assert!(client.calculate_data_result(1, "t").unwrap().is_some());
        assert!(client.generate_hper_result(1, "t").unwrap().is_none());
    }

    #[test]
    fn undecodable_task_result_ends_polling() {
        let transport = ScriptedTransport::new([
            ApiResponse::new(200, r#"{"task_id": "t"}"#),
            ApiResponse::new(500, "<html>Internal Server Error</html>"),
        ]);
        let (client, _dir) = client(&transport, Identity::User);
        let outcome = client
            .run_task_with_sleep(TaskKind::DailyAvailability, 3, &Query::new(), |_| {})
            .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::UnknownStatus {
                task_id: "t".to_string(),
                status: None,
                result: Value::String("<html>Internal Server Error</html>".to_string()),
            }
        );
        assert!(!outcome.is_success());
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let transport = ScriptedTransport::failing();
        let (client, _dir) = client(&transport, Identity::User);
        assert!(client.get_user_plants_access().unwrap_err().is_connection());
    }
}
