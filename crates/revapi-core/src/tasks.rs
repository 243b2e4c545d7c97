//! Submit-then-poll handling for server-side report and calculation jobs.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_ATTEMPTS};
use crate::endpoint::Endpoint;

/// How often and how many times a task result is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Hper,
    DailyAvailability,
    DailyMetrics,
    CalculateData,
    RecalculateData,
}

impl TaskKind {
    pub fn submit_endpoint(self) -> Endpoint {
        match self {
            TaskKind::Hper => Endpoint::GenerateHper,
            TaskKind::DailyAvailability => Endpoint::GenerateDailyAvailability,
            TaskKind::DailyMetrics => Endpoint::GenerateDailyMetrics,
            TaskKind::CalculateData => Endpoint::CalculateData,
            TaskKind::RecalculateData => Endpoint::RecalculateData,
        }
    }

    pub fn result_endpoint(self) -> Endpoint {
        match self {
            TaskKind::Hper => Endpoint::GenerateHperResult,
            TaskKind::DailyAvailability => Endpoint::GenerateDailyAvailabilityResult,
            TaskKind::DailyMetrics => Endpoint::GenerateDailyMetricsResult,
            TaskKind::CalculateData => Endpoint::CalculateDataResult,
            TaskKind::RecalculateData => Endpoint::RecalculateDataResult,
        }
    }

    /// Calculation results are also delivered with 200, report results only with 201.
    pub fn accepts_ok_result(self) -> bool {
        matches!(self, TaskKind::CalculateData | TaskKind::RecalculateData)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Success,
    Error,
    Unknown(Option<String>),
}

impl TaskStatus {
    pub fn of(result: &Value) -> Self {
        match result.get("status").and_then(Value::as_str) {
            Some("pending") => TaskStatus::Pending,
            Some("success") => TaskStatus::Success,
            Some("error") => TaskStatus::Error,
            Some(other) => TaskStatus::Unknown(Some(other.to_string())),
            None => TaskStatus::Unknown(None),
        }
    }
}

/// What the submission response asked us to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Scheduled { task_id: String },
    AlreadyCurrent { message: String },
    MissingTaskId { body: Value },
}

impl Submission {
    /// `task_id` may arrive as a string or a number.
    pub fn parse(body: &Value) -> Self {
        match body.get("task_id") {
            Some(Value::String(id)) => Submission::Scheduled {
                task_id: id.clone(),
            },
            Some(Value::Number(id)) => Submission::Scheduled {
                task_id: id.to_string(),
            },
            _ => match body.get("message") {
                Some(Value::String(message)) => Submission::AlreadyCurrent {
                    message: message.clone(),
                },
                Some(other) => Submission::AlreadyCurrent {
                    message: other.to_string(),
                },
                None => Submission::MissingTaskId { body: body.clone() },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    NotScheduled,
    AlreadyCurrent { message: String },
    MissingTaskId { body: Value },
    ResultUnavailable { task_id: String },
    Succeeded { task_id: String, result: Value },
    Failed { task_id: String, result: Value },
    UnknownStatus {
        task_id: String,
        status: Option<String>,
        result: Value,
    },
    TimedOut { task_id: String, attempts: u32 },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TaskOutcome::Succeeded { .. } | TaskOutcome::AlreadyCurrent { .. }
        )
    }

    /// Emit the outcome the way an operator expects to read it.
    pub fn log(&self) {
        match self {
            TaskOutcome::NotScheduled => error!("Task scheduling failed"),
            TaskOutcome::AlreadyCurrent { message } => info!("{message}"),
            TaskOutcome::MissingTaskId { body } => {
                error!("Task id not found");
                debug!(body = %body, "Submission response");
            }
            TaskOutcome::ResultUnavailable { task_id } => {
                error!(task_id = %task_id, "Task result not found")
            }
            TaskOutcome::Succeeded { task_id, result } => {
                info!(task_id = %task_id, "Task completed successfully");
                debug!(result = %result, "Task result");
            }
            TaskOutcome::Failed { task_id, result } => {
                error!(task_id = %task_id, "Task failed");
                debug!(result = %result, "Task result");
            }
            TaskOutcome::UnknownStatus {
                task_id,
                status,
                result,
            } => {
                error!(task_id = %task_id, status = ?status, "Task status unknown");
                debug!(result = %result, "Task result");
            }
            TaskOutcome::TimedOut { task_id, attempts } => {
                error!(task_id = %task_id, attempts, "Task still pending after polling limit")
            }
        }
    }
}

/// Request the result of `task_id` until it leaves `pending`.
///
/// `fetch` performs one result call; `None` means the call produced no usable
/// body. `sleep` runs between consecutive calls only.
pub fn poll_until_terminal<F, S, E>(
    task_id: &str,
    policy: &PollPolicy,
    mut fetch: F,
    mut sleep: S,
) -> Result<TaskOutcome, E>
where
    F: FnMut(&str) -> Result<Option<Value>, E>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let Some(result) = fetch(task_id)? else {
            return Ok(TaskOutcome::ResultUnavailable {
                task_id: task_id.to_string(),
            });
        };
        let task_id = task_id.to_string();
        match TaskStatus::of(&result) {
            TaskStatus::Pending => {
                if attempts >= max_attempts {
                    return Ok(TaskOutcome::TimedOut { task_id, attempts });
                }
                info!(task_id = %task_id, attempt = attempts, "Task is pending");
                sleep(policy.interval);
            }
            TaskStatus::Success => return Ok(TaskOutcome::Succeeded { task_id, result }),
            TaskStatus::Error => return Ok(TaskOutcome::Failed { task_id, result }),
            TaskStatus::Unknown(status) => {
                return Ok(TaskOutcome::UnknownStatus {
                    task_id,
                    status,
                    result,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::convert::Infallible;

    fn scripted(
        bodies: Vec<Option<Value>>) -> impl FnMut(&str,
    ) -> Result<Option<Value>, Infallible> {
        let mut queue: VecDeque<Option<Value>> = bodies.into();
        move |_: &str| Ok(queue.pop_front().flatten())
    }

    #[test]
    fn submission_accepts_string_and_numeric_ids() {
        assert_eq!(
            Submission::parse(&json!({"task_id": "abc"})),
            Submission::Scheduled {
                task_id: "abc".to_string()
            }
        );
        assert_eq!(
            Submission::parse(&json!({"task_id": 17})),
            Submission::Scheduled {
                task_id: "17".to_string()
            }
        );
    }

    #[test]
    fn submission_with_message_is_already_current() {
        assert_eq!(
            Submission::parse(&json!({"message": "already current"})),
            Submission::AlreadyCurrent {
                message: "already current".to_string()
            }
        );
        assert!(matches!(
            Submission::parse(&json!({"detail": "?"})),
            Submission::MissingTaskId { .. }
        ));
    }

    #[test]
    fn pending_twice_then_success_sleeps_twice() {
        let mut sleeps = Vec::new();
        let outcome = poll_until_terminal(
            "t1",
            &PollPolicy::default(),
            scripted(vec![
                Some(json!({"status": "pending"})),
                Some(json!({"status": "pending"})),
                Some(json!({"status": "success", "data": [1]})),
            ]),
            |delay| sleeps.push(delay),
        )
        .unwrap();
        assert_eq!(sleeps, vec![Duration::from_millis(200); 2]);
        assert_eq!(
            outcome,
            TaskOutcome::Succeeded {
                task_id: "t1".to_string(),
                result: json!({"status": "success", "data": [1]}),
            }
        );
    }

    #[test]
    fn polling_stops_at_attempt_limit() {
        let policy = PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 3,
        };
        let mut calls = 0;
        let outcome = poll_until_terminal::<_, _, Infallible>(
            "t2",
            &policy,
            |_| {
                calls += 1;
                Ok(Some(json!({"status": "pending"})))
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(
            outcome,
            TaskOutcome::TimedOut {
                task_id: "t2".to_string(),
                attempts: 3
            }
        );
    }

    #[test]
    fn error_and_unknown_statuses_are_terminal() {
        let outcome = poll_until_terminal(
            "t3",
            &PollPolicy::default(),
            scripted(vec![Some(json!({"status": "error"}))]),
            |_| {},
        )
        .unwrap();
        assert!(matches!(outcome, TaskOutcome::Failed { .. }));

        let outcome = poll_until_terminal(
            "t4",
            &PollPolicy::default(),
            scripted(vec![Some(json!({"detail": "Not found."}))]),
            |_| {},
        )
        .unwrap();
        assert!(matches!(
            outcome,
            TaskOutcome::UnknownStatus { status: None, .. }
        ));
    }

    #[test]
    fn missing_result_is_unavailable() {
        let outcome =
            poll_until_terminal("t5", &PollPolicy::default(), scripted(vec![None]), |_| {})
                .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::ResultUnavailable {
                task_id: "t5".to_string()
            }
        );
    }
}
