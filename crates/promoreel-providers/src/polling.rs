//! Wait-for-completion protocol for asynchronous provider operations.
//!
//! A provider hands back an operation handle plus an ordered list of
//! candidate status endpoints. Each round queries the candidates in order
//! (the last endpoint that answered goes first) until one responds with
//! something other than "not found", then classifies the reported status.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::build_client;
use crate::metrics;

const STATUS_KEYS: &[&str] = &["status", "state", "task_status"];
const OUTPUT_KEYS: &[&str] = &[
    "output",
    "video_url",
    "videoUrl",
    "url",
    "content",
    "task_result",
    "videos",
];
const NESTED_URL_KEYS: &[&str] = &["url", "video_url", "videoUrl", "uri"];

const SUCCESS_STATES: &[&str] = &["succeeded", "success", "succeed", "complete", "completed", "done"];
const FAILURE_STATES: &[&str] = &["failed", "error", "cancelled", "canceled"];
const RUNNING_STATES: &[&str] = &[
    "running",
    "pending",
    "processing",
    "queued",
    "in_progress",
    "in-progress",
    "submitted",
    "starting",
];

/// Result of querying a single status endpoint once.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Endpoint answered with a JSON body
    Payload(Value),
    /// Endpoint does not know this handle (404)
    NotFound,
    /// 5xx, worth another round
    ServerError { status: u16 },
    /// Any other 4xx, fatal
    ClientError { status: u16, body: String },
    /// Connection, timeout, or body decoding failure
    Transport(String),
}

/// Something that can ask a provider about an operation.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query(&self, endpoint: &str) -> QueryOutcome;
}

/// Status query over HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpStatusQuery {
    http: Client,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl HttpStatusQuery {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(request_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl StatusQuery for HttpStatusQuery {
    async fn query(&self, endpoint: &str) -> QueryOutcome {
        let url = self.url_for(endpoint);
        let mut request = self.http.get(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return QueryOutcome::Transport(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return QueryOutcome::NotFound;
        }
        if status.is_server_error() {
            return QueryOutcome::ServerError {
                status: status.as_u16(),
            };
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return QueryOutcome::ClientError {
                status: status.as_u16(),
                body,
            };
        }

        match response.json::<Value>().await {
            Ok(v) => QueryOutcome::Payload(v),
            Err(e) => QueryOutcome::Transport(format!("unreadable status body: {}", e)),
        }
    }
}

/// Classified operation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Succeeded,
    Failed,
    Running,
    /// Unrecognized value, treated as still running
    Unknown(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Classify a raw status string, case-insensitively.
pub fn classify_status(raw: Option<&str>) -> TaskState {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return TaskState::Running;
    };
    let lower = raw.to_ascii_lowercase();
    if SUCCESS_STATES.contains(&lower.as_str()) {
        TaskState::Succeeded
    } else if FAILURE_STATES.contains(&lower.as_str()) {
        TaskState::Failed
    } else if RUNNING_STATES.contains(&lower.as_str()) {
        TaskState::Running
    } else {
        TaskState::Unknown(raw.to_string())
    }
}

/// The payload itself plus its `data` and `response` envelopes.
fn scopes(payload: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(payload).chain(
        ["data", "response"]
            .into_iter()
            .filter_map(move |k| payload.get(k).filter(|v| v.is_object())),
    )
}

/// Find the status string on the payload or its `data` envelope.
///
/// Long-running-operation bodies that only carry `done: true` count as
/// finished (failed when an `error` object is present).
pub fn extract_status(payload: &Value) -> Option<String> {
    for scope in scopes(payload) {
        for key in STATUS_KEYS {
            if let Some(Value::String(s)) = scope.get(*key) {
                return Some(s.clone());
            }
        }
    }
    match payload.get("done") {
        Some(Value::Bool(true)) if payload.get("error").is_some() => Some("failed".to_string()),
        Some(Value::Bool(true)) => Some("done".to_string()),
        _ => None,
    }
}

/// Normalize whatever shape the output took into one reference.
fn reference_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(reference_from),
        Value::Object(map) => NESTED_URL_KEYS
            .iter()
            .chain(OUTPUT_KEYS)
            .find_map(|k| map.get(*k).and_then(reference_from)),
        _ => None,
    }
}

/// Find the output reference on a terminal payload.
pub fn extract_output(payload: &Value) -> Option<String> {
    scopes(payload).find_map(|scope| {
        OUTPUT_KEYS
            .iter()
            .find_map(|k| scope.get(*k).and_then(reference_from))
    })
}

fn extract_error(payload: &Value) -> String {
    scopes(payload)
        .find_map(|scope| {
            ["error", "failure", "failure_reason", "task_status_msg", "message"]
                .iter()
                .find_map(|k| scope.get(*k))
        })
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Object(o) => o
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Query order for one round: the preferred endpoint first, then the rest
/// in their original order.
fn round_order(count: usize, preferred: Option<usize>) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::with_capacity(count);
    if let Some(p) = preferred.filter(|p| *p < count) {
        order.push(p);
    }
    order.extend((0..count).filter(|i| Some(*i) != preferred));
    order
}

/// Poll `operation` until it reaches a terminal state.
///
/// Returns the output reference on success. Fails with
/// [`ProviderError::PollingEndpoint`] once every candidate has answered
/// "not found" for `not_found_rounds` consecutive rounds, and with
/// [`ProviderError::Timeout`] when the attempt budget runs out.
pub async fn poll_until_complete(
    source: &dyn StatusQuery,
    provider: &str,
    operation: &str,
    candidates: &[String],
    config: &PollConfig,
) -> ProviderResult<String> {
    if candidates.is_empty() {
        return Err(ProviderError::PollingEndpoint {
            operation: operation.to_string(),
        });
    }

    let started = Instant::now();
    let mut preferred: Option<usize> = None;
    let mut not_found_rounds = 0u32;

    info!(provider, operation, endpoints = candidates.len(), "Polling operation");

    for attempt in 1..=config.max_attempts {
        let mut all_not_found = true;
        let mut payload = None;

        for idx in round_order(candidates.len(), preferred) {
            let endpoint = &candidates[idx];
            match source.query(endpoint).await {
                QueryOutcome::NotFound => {
                    metrics::record_poll(provider, "not_found");
                    debug!(provider, operation, endpoint = %endpoint, "Status endpoint returned not found");
                }
                QueryOutcome::Payload(value) => {
                    metrics::record_poll(provider, "ok");
                    all_not_found = false;
                    if preferred != Some(idx) {
                        info!(provider, operation, endpoint = %endpoint, "Using status endpoint");
                        preferred = Some(idx);
                    }
                    payload = Some(value);
                    break;
                }
                QueryOutcome::ServerError { status } => {
                    metrics::record_poll(provider, "server_error");
                    all_not_found = false;
                    warn!(provider, operation, endpoint = %endpoint, status, "Transient status error");
                    break;
                }
                QueryOutcome::Transport(message) => {
                    metrics::record_poll(provider, "transport_error");
                    all_not_found = false;
                    warn!(provider, operation, endpoint = %endpoint, error = %message, "Status request failed");
                    break;
                }
                QueryOutcome::ClientError { status, body } => {
                    metrics::record_poll(provider, "client_error");
                    return Err(match status {
                        401 | 403 => ProviderError::auth(provider, format!("status poll rejected: {}", status)),
                        _ => ProviderError::request_failed(format!(
                            "{} status poll for {} returned {}: {}",
                            provider, operation, status, body
                        )),
                    });
                }
            }
        }

        if all_not_found {
            not_found_rounds += 1;
            if not_found_rounds >= config.not_found_rounds {
                warn!(provider, operation, rounds = not_found_rounds, "No status endpoint recognizes operation");
                return Err(ProviderError::PollingEndpoint {
                    operation: operation.to_string(),
                });
            }
        } else {
            not_found_rounds = 0;
        }

        if let Some(payload) = payload {
            let raw = extract_status(&payload);
            match classify_status(raw.as_deref()) {
                TaskState::Succeeded => {
                    metrics::record_poll_wait(provider, started.elapsed().as_secs_f64());
                    return extract_output(&payload).ok_or_else(|| {
                        ProviderError::inconsistent(format!(
                            "operation {} succeeded without an output reference",
                            operation
                        ))
                    });
                }
                TaskState::Failed => {
                    return Err(ProviderError::GenerationFailed {
                        operation: operation.to_string(),
                        message: extract_error(&payload),
                    });
                }
                TaskState::Running => {
                    if attempt <= 3 || attempt % 10 == 0 {
                        debug!(provider, operation, attempt, status = ?raw, "Operation still running");
                    }
                }
                TaskState::Unknown(status) => {
                    warn!(provider, operation, attempt, status = %status, "Unknown operation status, continuing");
                }
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    Err(ProviderError::Timeout {
        operation: operation.to_string(),
        attempts: config.max_attempts,
    })
}
