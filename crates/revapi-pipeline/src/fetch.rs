//! Monthly meter readings from the PRMT measurements service.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Url;
use revapi_core::measurements::write_records;
use revapi_core::{ApiRequest, ApiResponse, Method, OutputFormat, Transport};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::config::{DEFAULT_CHANNELS, Tunables};
use crate::error::PipelineError;

pub const RECORD_COLUMNS: [&str; 2] = ["timestamp", "act_energy"];

/// `YYYYMM010000`, the first instant of the month.
pub fn period(year: i32, month: u32) -> Result<String, PipelineError> {
    if !(1000..=9999).contains(&year) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
        return Err(PipelineError::InvalidPeriod { year, month });
    }
    Ok(format!("{year:04}{month:02}010000"))
}

pub fn output_path(dir: &Path, plant: &str, period: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("PRMT-{plant}-{period}.{}", format.extension()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyReadings {
    #[serde(default)]
    period: Option<Value>,
    #[serde(default)]
    last_reading_date: Option<String>,
    #[serde(default)]
    measurement: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reading {
    date_range: String,
    channel3: Value,
}

/// Turn one month of readings into `{timestamp, act_energy}` records.
///
/// Timestamps drop everything from the first `.`; energy is channel 3.
pub fn format_measurements(payload: &Value) -> Result<Vec<Value>, PipelineError> {
    let readings: MonthlyReadings = serde_json::from_value(payload.clone())
        .map_err(|err| PipelineError::Payload(err.to_string()))?;
    let last_update = readings
        .last_reading_date
        .as_deref()
        .map(|raw| raw.split('+').next().unwrap_or(raw));
    info!(
        period = ?readings.period,
        last_update = last_update.unwrap_or("unknown"),
        readings = readings.measurement.len(),
        "Formatting PRMT readings"
    );
    Ok(readings
        .measurement
        .into_iter()
        .map(|reading| {
            let timestamp = reading
                .date_range
                .split('.')
                .next()
                .unwrap_or(&reading.date_range)
                .to_string();
            json!({"timestamp": timestamp, "act_energy": reading.channel3})
        })
        .collect())
}

pub struct PrmtConsumer<T> {
    transport: T,
    tunables: Tunables,
    channels: String,
}

impl<T: Transport> PrmtConsumer<T> {
    pub fn new(transport: T, tunables: Tunables) -> Self {
        Self {
            transport,
            tunables,
            channels: DEFAULT_CHANNELS.to_string(),
        }
    }

    pub fn with_channels(mut self, channels: impl Into<String>) -> Self {
        self.channels = channels.into();
        self
    }

    fn url(&self, point: &str, period: &str) -> Result<Url, PipelineError> {
        Url::parse_with_params(
            &self.tunables.measurements_url(),
            [
                ("user_key", self.tunables.api_key.as_str()),
                ("channelId", self.channels.as_str()),
                ("period", period),
                ("measurePointId", point),
            ],
        )
        .map_err(|err| PipelineError::Config(format!("invalid PRMT URL: {err}")))
    }

    /// Fetch the raw month for `point`. The service wraps it in a one-element list.
    pub fn request_measurements(&self, point: &str, period: &str) -> Result<Value, PipelineError> {
        let request = ApiRequest::new(Method::Get, self.url(point, period)?);
        info!(point, period, "Requesting PRMT data");
        let response = fetch_with_retries("prmt", &self.tunables, || {
            self.transport.execute(&request)
        })?;
        if response.status != 200 {
            error!(point, period, "PRMT request failed: {}", response.describe());
            return Err(PipelineError::message(format!(
                "PRMT responded with {}",
                response.describe()
            )));
        }
        match response.json()? {
            Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
            other => Err(PipelineError::Payload(format!(
                "expected a one-element list, got {other}"
            ))),
        }
    }

    /// Download, format and save one plant's month; returns the written path.
    pub fn download(
        &self,
        plant: &str,
        point: &str,
        period: &str,
        format: OutputFormat,
        output_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let payload = self.request_measurements(point, period)?;
        info!(plant, period, "PRMT data retrieved");
        let records = format_measurements(&payload)?;
        let path = output_path(output_dir, plant, period, format);
        write_records(&path, &records, format, &RECORD_COLUMNS)?;
        Ok(path)
    }
}

fn fetch_with_retries<F>(
    label: &str,
    tunables: &Tunables,
    mut op: F,
) -> Result<ApiResponse, PipelineError>
where
    F: FnMut() -> Result<ApiResponse, revapi_core::TransportError>,
{
    let max = tunables.max_retries.max(1);
    let backoff = Duration::from_millis(tunables.retry_backoff_ms);
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let reason = match op() {
            Ok(response) if response.status >= 500 || response.status == 429 => {
                format!("HTTP {}", response.status)
            }
            Ok(response) => return Ok(response),
            Err(err) => err.to_string(),
        };

        if attempt >= max {
            return Err(PipelineError::Fetch {
                label: label.to_string(),
                attempts: attempt,
                reason,
            });
        }
        warn!(label, attempt, reason = %reason, "Retrying request");
        thread::sleep(backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Canned {
        responses: RefCell<VecDeque<ApiResponse>>,
        urls: RefCell<Vec<Url>>,
    }

    impl Canned {
        fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| ApiResponse::new(status, body))
                        .collect(),
                ),
                urls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Canned {
        fn execute(
            &self,
            request: &ApiRequest,
        ) -> Result<ApiResponse, revapi_core::TransportError> {
            self.urls.borrow_mut().push(request.url.clone());
            Ok(self.responses.borrow_mut().pop_front().unwrap())
        }
    }

    fn tunables() -> Tunables {
        Tunables {
            cen_api_url: "https://cen.example.com/api/".to_string(),
            medidas_url: "medidas".to_string(),
            api_key: "secret".to_string(),
            max_retries: 3,
            retry_backoff_ms: 0,
        }
    }

    const MONTH: &str = r#"[{
        "period": "202403",
        "lastReadingDate": "2024-04-01T00:15:00+00:00",
        "measurement": [
            {"dateRange": "2024-03-01 00:15:00.000", "channel1": 0, "channel3": 12.5},
            {"dateRange": "2024-03-01 00:30:00.000", "channel1": 0, "channel3": 13.0}
        ]
    }]"#;

    #[test]
    fn period_is_first_instant_of_month() {
        assert_eq!(period(2024, 3).unwrap(), "202403010000");
        assert!(period(2024, 13).is_err());
        assert!(period(24, 3).is_err());
    }

    #[test]
    fn readings_become_timestamp_energy_records() {
        let payload: Value = serde_json::from_str::<Vec<Value>>(MONTH).unwrap().remove(0);
        let records = format_measurements(&payload).unwrap();
        assert_eq!(
            records,
            vec![
                json!({"timestamp": "2024-03-01 00:15:00", "act_energy": 12.5}),
                json!({"timestamp": "2024-03-01 00:30:00", "act_energy": 13.0}),
            ]
        );
    }

    #[test]
    fn request_carries_service_parameters() {
        let consumer = PrmtConsumer::new(Canned::new(vec![(200, MONTH)]), tunables());
        let payload = consumer
            .request_measurements("MRCHIGUE_013_PMGD5_TPE", "202403010000")
            .unwrap();
        assert_eq!(payload["period"], "202403");

        let url = consumer.transport.urls.borrow()[0].clone();
        assert_eq!(url.path(), "/api/medidas");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("user_key".to_string(), "secret".to_string()),
                ("channelId".to_string(), "1,2,3,4".to_string()),
                ("period".to_string(), "202403010000".to_string()),
                ("measurePointId".to_string(), "MRCHIGUE_013_PMGD5_TPE".to_string()),
            ]
        );
    }

    #[test]
    fn server_errors_are_retried_until_limit() {
        let consumer = PrmtConsumer::new(
            Canned::new(vec![(503, "busy"), (429, "slow down"), (200, MONTH)]),
            tunables(),
        );
        assert!(consumer.request_measurements("P", "202403010000").is_ok());

        let consumer = PrmtConsumer::new(
            Canned::new(vec![(500, "a"), (500, "b"), (500, "c")]),
            tunables(),
        );
        let err = consumer.request_measurements("P", "202403010000").unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { attempts: 3, .. }));
    }

    #[test]
    fn client_errors_are_not_retried() {
        let consumer = PrmtConsumer::new(Canned::new(vec![(403, "bad key")]), tunables());
        let err = consumer.request_measurements("P", "202403010000").unwrap_err();
        assert!(err.to_string().contains("403"));
        assert_eq!(consumer.transport.urls.borrow().len(), 1);
    }

    #[test]
    fn empty_list_is_a_payload_error() {
        let consumer = PrmtConsumer::new(Canned::new(vec![(200, "[]")]), tunables());
        assert!(matches!(
            consumer.request_measurements("P", "202403010000"),
            Err(PipelineError::Payload(_))
        ));
    }

    #[test]
    fn download_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let consumer = PrmtConsumer::new(Canned::new(vec![(200, MONTH)]), tunables());
        let path = consumer
            .download(
                "Margarita",
                "MRCHIGUE_013_PMGD5_TPE",
                "202403010000",
                OutputFormat::Csv,
                dir.path(),
            )
            .unwrap();
        assert_eq!(path, dir.path().join("PRMT-Margarita-202403010000.csv"));
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            written,
            "timestamp,act_energy\n2024-03-01 00:15:00,12.5\n2024-03-01 00:30:00,13.0\n"
        );
    }
}
