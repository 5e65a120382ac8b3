//! SUSHI API client
//!
//! Issues one SUSHI call at a time with a fixed two-attempt timeout policy
//! (primary attempt, then exactly one retry with a longer timeout), spaces
//! calls to the same provider, substitutes an archived response when a
//! provider answers 403, and classifies COUNTER exceptions in the body.

use crate::services::counter_exceptions::{self, CounterException};
use crate::types::{FallbackKey, FallbackStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sushi_common::config::SushiConfig;
use sushi_common::SushiEndpoint;
use thiserror::Error;
use tokio::sync::Mutex;

/// Path of the report listing endpoint
pub const REPORTS_PATH: &str = "reports";
/// Path of the service status endpoint
pub const STATUS_PATH: &str = "status";

/// Terminal failures of a SUSHI call
#[derive(Debug, Error)]
pub enum SushiError {
    #[error("Request timed out after retry ({timeout:?})")]
    Timeout { timeout: Duration },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP 403 and no previously downloaded response is available")]
    Forbidden,

    #[error("Reading previously downloaded response failed: {0}")]
    Fallback(String),

    #[error("Response body was empty")]
    EmptyBody,

    #[error("Response body could not be parsed: {0}")]
    Unparseable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("COUNTER exception: {}", join_exceptions(.0))]
    Counter(Vec<CounterException>),
}

fn join_exceptions(exceptions: &[CounterException]) -> String {
    exceptions
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classified outcome of a SUSHI call that produced a JSON body
#[derive(Debug, Clone, PartialEq)]
pub enum SushiResponse {
    /// Usable body with any advisory alerts the provider attached
    Payload {
        body: Map<String, Value>,
        alerts: Vec<CounterException>,
    },
    /// The provider answered with blocking COUNTER exceptions
    Exceptions(Vec<CounterException>),
}

impl SushiResponse {
    pub fn alerts(&self) -> &[CounterException] {
        match self {
            SushiResponse::Payload { alerts, .. } => alerts,
            SushiResponse::Exceptions(_) => &[],
        }
    }
}

/// Failure of a single attempt, before the retry policy is applied
enum AttemptError {
    Timeout,
    Connection(String),
    Status(u16, String),
    Request(String),
}

impl AttemptError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptError::Timeout
        } else if e.is_connect() {
            AttemptError::Connection(e.to_string())
        } else {
            AttemptError::Request(e.to_string())
        }
    }
}

/// Spacing of calls per provider host
struct ProviderRateLimiter {
    next_slot: Mutex<HashMap<String, Instant>>,
    min_interval: Duration,
}

impl ProviderRateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            next_slot: Mutex::new(HashMap::new()),
            min_interval,
        }
    }

    /// Wait if necessary so calls to `provider` are at least `min_interval` apart
    async fn wait(&self, provider: &str) {
        let wait_time = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(provider).copied().filter(|s| *s > now).unwrap_or(now);
            slots.insert(provider.to_string(), slot + self.min_interval);
            slot - now
        };

        if !wait_time.is_zero() {
            tracing::debug!(provider = %provider, "Rate limiting: waiting {:?}", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }
}

/// SUSHI API client
pub struct SushiClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<ProviderRateLimiter>,
    primary_timeout: Duration,
    retry_timeout: Duration,
    fallback_store: Option<Arc<dyn FallbackStore>>,
}

impl SushiClient {
    pub fn new(config: &SushiConfig) -> Result<Self, SushiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SushiError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(ProviderRateLimiter::new(config.min_request_interval())),
            primary_timeout: config.primary_timeout(),
            retry_timeout: config.retry_timeout(),
            fallback_store: None,
        })
    }

    /// Archive consulted when a provider refuses a call with 403
    pub fn with_fallback_store(mut self, store: Arc<dyn FallbackStore>) -> Self {
        self.fallback_store = Some(store);
        self
    }

    /// Override both attempt timeouts
    pub fn with_timeouts(mut self, primary: Duration, retry: Duration) -> Self {
        self.primary_timeout = primary;
        self.retry_timeout = retry;
        self
    }

    /// Call `path` on `endpoint` and classify the response
    ///
    /// `fallback` identifies the archived response to use if the provider
    /// answers 403; without it a 403 is terminal.
    pub async fn fetch(
        &self,
        endpoint: &SushiEndpoint,
        path: &str,
        params: &[(&str, String)],
        fallback: Option<&FallbackKey>,
    ) -> Result<SushiResponse, SushiError> {
        let url = endpoint.url_for(path);
        let full_url = format!("{}?{}", url, query_string(endpoint, params));
        let provider = endpoint.provider_key();

        tracing::debug!(provider = %provider, url = %url, "Querying SUSHI API");

        let outcome = match self.attempt(&provider, &full_url, self.primary_timeout).await {
            Err(AttemptError::Timeout) => {
                tracing::warn!(
                    url = %url,
                    "SUSHI call timed out after {:?}, retrying once with {:?}",
                    self.primary_timeout,
                    self.retry_timeout
                );
                self.attempt(&provider, &full_url, self.retry_timeout).await
            }
            other => other,
        };

        match outcome {
            Ok(bytes) => parse_response(path, &bytes),
            Err(AttemptError::Status(403, _)) => {
                tracing::warn!(url = %url, "SUSHI call refused with 403, trying previously downloaded response");
                let bytes = self.fallback_bytes(fallback).await?;
                parse_response(path, &bytes)
            }
            Err(AttemptError::Timeout) => Err(SushiError::Timeout {
                timeout: self.retry_timeout,
            }),
            Err(AttemptError::Connection(msg)) => Err(SushiError::Connection(msg)),
            Err(AttemptError::Request(msg)) => Err(SushiError::Request(msg)),
            Err(AttemptError::Status(status, body)) => Err(SushiError::HttpStatus { status, body }),
        }
    }

    /// Service status (`status` path)
    pub async fn status(&self, endpoint: &SushiEndpoint) -> Result<SushiResponse, SushiError> {
        self.fetch(endpoint, STATUS_PATH, &[], None).await
    }

    /// `Report_ID`s offered by the provider (`reports` path)
    pub async fn reports(&self, endpoint: &SushiEndpoint) -> Result<Vec<String>, SushiError> {
        match self.fetch(endpoint, REPORTS_PATH, &[], None).await? {
            SushiResponse::Exceptions(exceptions) => Err(SushiError::Counter(exceptions)),
            SushiResponse::Payload { body, .. } => {
                let listing = body
                    .get("reports")
                    .and_then(Value::as_array)
                    .ok_or_else(|| SushiError::Unparseable("report listing is not a list".to_string()))?;
                Ok(listing
                    .iter()
                    .filter_map(|entry| entry.get("Report_ID").and_then(Value::as_str))
                    .map(|id| id.trim().to_string())
                    .collect())
            }
        }
    }

    async fn attempt(
        &self,
        provider: &str,
        full_url: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, AttemptError> {
        self.rate_limiter.wait(provider).await;

        let response = self
            .http_client
            .get(full_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status(status.as_u16(), error_text));
        }

        let bytes = response.bytes().await.map_err(AttemptError::from_reqwest)?;
        Ok(bytes.to_vec())
    }

    async fn fallback_bytes(&self, key: Option<&FallbackKey>) -> Result<Vec<u8>, SushiError> {
        let (Some(store), Some(key)) = (&self.fallback_store, key) else {
            return Err(SushiError::Forbidden);
        };
        match store.fallback_file_for(key).await {
            Ok(Some(bytes)) => {
                tracing::info!(
                    source_id = key.statistics_source_id,
                    report = %key.report_type,
                    range = %key.range,
                    "Using previously downloaded SUSHI response"
                );
                Ok(bytes)
            }
            Ok(None) => Err(SushiError::Forbidden),
            Err(e) => Err(SushiError::Fallback(e.to_string())),
        }
    }
}

/// Serialize credentials and parameters literally as `key=value&key=value`
///
/// Values are not percent-encoded: several providers reject `%7C` in place of
/// the `|` separating `attributes_to_show` entries.
fn query_string(endpoint: &SushiEndpoint, params: &[(&str, String)]) -> String {
    endpoint
        .credential_params()
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .chain(params.iter().map(|(k, v)| format!("{}={}", k, v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parse and classify a SUSHI body (live or archived)
pub fn parse_response(path: &str, bytes: &[u8]) -> Result<SushiResponse, SushiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(SushiError::EmptyBody);
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| SushiError::Unparseable(e.to_string()))?;
    let body = into_object(path, value)?;

    let scan = counter_exceptions::scan(&body);
    for alert in &scan.advisory {
        tracing::warn!(path = %path, "SUSHI alert: {}", alert);
    }
    if scan.is_blocking() {
        return Ok(SushiResponse::Exceptions(scan.blocking));
    }

    Ok(SushiResponse::Payload {
        body,
        alerts: scan.advisory,
    })
}

fn into_object(path: &str, value: Value) -> Result<Map<String, Value>, SushiError> {
    let is_listing = path.trim_matches('/') == REPORTS_PATH;
    match value {
        Value::Object(body) => Ok(body),
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => {
            let only = items.remove(0);
            let only_is_exception = only
                .as_object()
                .map(looks_like_exception)
                .unwrap_or(false);
            match only {
                Value::Object(body) if !is_listing || only_is_exception => Ok(body),
                other => Ok(wrap_listing(vec![other])),
            }
        }
        Value::Array(items) if is_listing => Ok(wrap_listing(items)),
        Value::Array(items) => Err(SushiError::Unparseable(format!(
            "expected a single object, got a list of {}",
            items.len()
        ))),
        other => Err(SushiError::Unparseable(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn looks_like_exception(object: &Map<String, Value>) -> bool {
    ["Code", "code", "Severity", "Exception"]
        .iter()
        .any(|key| object.contains_key(*key))
}

fn wrap_listing(items: Vec<Value>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("reports".to_string(), Value::Array(items));
    body
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SushiClient::new(&SushiConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_query_string_is_not_percent_encoded() {
        let mut endpoint = SushiEndpoint::new("https://sushi.example.org/r5", "cust1");
        endpoint.requestor_id = Some("req1".to_string());
        let query = query_string(
            &endpoint,
            &[("attributes_to_show", "Data_Type|Access_Method".to_string())],
        );
        assert_eq!(
            query,
            "customer_id=cust1&requestor_id=req1&attributes_to_show=Data_Type|Access_Method"
        );
    }

    #[test]
    fn test_one_element_list_is_unwrapped() {
        let response = parse_response("status", br#"[{"Service_Active": true}]"#).unwrap();
        match response {
            SushiResponse::Payload { body, .. } => assert_eq!(body["Service_Active"], true),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_multi_element_list_is_unparseable() {
        let result = parse_response("reports/tr", br#"[{"a": 1}, {"b": 2}]"#);
        assert!(matches!(result, Err(SushiError::Unparseable(_))));
    }

    #[test]
    fn test_scalar_body_is_unparseable() {
        let result = parse_response("reports/tr", b"\"maintenance\"");
        assert!(matches!(result, Err(SushiError::Unparseable(_))));
    }

    #[test]
    fn test_empty_body_is_terminal() {
        assert!(matches!(parse_response("reports/tr", b""), Err(SushiError::EmptyBody)));
        assert!(matches!(parse_response("reports/tr", b" \n"), Err(SushiError::EmptyBody)));
    }

    #[test]
    fn test_report_listing_is_wrapped() {
        let body = br#"[{"Report_ID": "PR"}, {"Report_ID": "TR"}]"#;
        match parse_response(REPORTS_PATH, body).unwrap() {
            SushiResponse::Payload { body, .. } => {
                assert_eq!(body["reports"].as_array().map(Vec::len), Some(2));
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match parse_response(REPORTS_PATH, br#"[{"Report_ID": "DR"}]"#).unwrap() {
            SushiResponse::Payload { body, .. } => {
                assert_eq!(body["reports"][0]["Report_ID"], "DR");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_one_element_listing_exception_is_classified() {
        let body = br#"[{"Code": 2010, "Severity": "Error", "Message": "Requestor Not Authorized"}]"#;
        match parse_response(REPORTS_PATH, body).unwrap() {
            SushiResponse::Exceptions(exceptions) => assert_eq!(exceptions[0].code, Some(2010)),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_alerts_ride_along_with_payload() {
        let body = br#"{"Service_Active": true, "Alerts": [{"Alert": "Planned outage"}]}"#;
        let response = parse_response(STATUS_PATH, body).unwrap();
        assert_eq!(response.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limiter_timing_per_provider() {
        let limiter = ProviderRateLimiter::new(Duration::from_millis(300));

        let start = Instant::now();

        // First request to each provider - no wait
        limiter.wait("a.example.org").await;
        limiter.wait("b.example.org").await;
        let first_elapsed = start.elapsed();

        // Second request to the same provider - should wait ~300ms
        limiter.wait("a.example.org").await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(100));
        assert!(second_elapsed >= Duration::from_millis(250));
    }
}
