//! HTTP client for the marketplace REST API.
//!
//! All requests are JSON over HTTPS with `Authorization: Bearer <token>`
//! taken from the [`SessionHandle`]. Response bodies are accepted bare or
//! wrapped in the API's envelope:
//!
//! ```json
//! { "success": true, "message": "ok", "data": { ... } }
//! ```
//!
//! Errors are normalised into [`MarketError`] in one place,
//! [`ApiClient::error_for_status`]. A 401 is routed to
//! [`SessionHandle::handle_unauthorized`] before the caller sees
//! `Unauthorized`.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::retry::{RetryConfig, with_retry};
use crate::session::SessionHandle;
use crate::telemetry;
use crate::{MarketError, Result};

/// Transport options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout. Default: 30s.
    pub timeout: Duration,
    /// Retry policy for GET requests.
    pub retry: RetryConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Query string pairs. Keys may repeat (`categoryIds=1&categoryIds=2`).
pub type Query = Vec<(&'static str, String)>;

/// Client for the marketplace API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionHandle,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `https://market.example.com/api`).
    pub fn new(
        base_url: impl Into<String>,
        session: SessionHandle,
        options: ClientOptions,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(options.timeout)
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| MarketError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(MarketError::Configuration("API base URL is empty".into()));
        }

        Ok(Self {
            http,
            base_url,
            session,
            retry: options.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// `GET path?query`, retried on transient errors.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T> {
        let body = with_retry(&self.retry, "GET", path, || {
            self.send(Method::GET, path, query, None)
        })
        .await?;
        decode(body)
    }

    /// `POST path` with a JSON body.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        decode(self.send(Method::POST, path, &Query::new(), Some(&body)).await?)
    }

    /// `PATCH path` with a JSON body, ignoring any response body.
    pub async fn patch<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, &Query::new(), Some(&body))
            .await
            .map(drop)
    }

    /// `DELETE path`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, &Query::new(), None)
            .await
            .map(drop)
    }

    /// Send one request and return the parsed body (`Value::Null` when empty).
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.session.token();

        let mut request = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(ref token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "method" => method.to_string(),
                    "status" => "error",
                )
                .increment(1);
                return Err(MarketError::Http(e.to_string()));
            }
        };
        let status = response.status();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.as_u16().to_string(),
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "method" => method.to_string())
            .record(started.elapsed().as_secs_f64());
        debug!(%method, path, status = status.as_u16(), "api response");

        if status == StatusCode::UNAUTHORIZED {
            self.session.handle_unauthorized(token.as_deref()).await;
            return Err(MarketError::Unauthorized);
        }

        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await?;
        let value = parse_body(&text);

        if !status.is_success() {
            return Err(Self::error_for_status(status, retry_after, &value, path));
        }
        if let Some(message) = envelope_failure(&value) {
            return Err(MarketError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(value)
    }

    /// Map a non-success (non-401) response to an error.
    fn error_for_status(
        status: StatusCode,
        retry_after: Option<Duration>,
        body: &Value,
        path: &str,
    ) -> MarketError {
        match status.as_u16() {
            404 => MarketError::NotFound(error_message(body).unwrap_or_else(|| path.to_string())),
            429 => MarketError::RateLimited { retry_after },
            code => MarketError::Api {
                status: code,
                message: error_message(body).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                }),
            },
        }
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Parse a response body. Non-JSON text is kept as a JSON string so that
/// error messages survive.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.trim().to_string()))
}

/// Whether `value` looks like the API's `{ success, message, data }` envelope.
fn is_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("data") && (obj.contains_key("success") || obj.contains_key("message"))
    })
}

/// Encode a caller-supplied id as a single URL path segment.
///
/// Reserved characters are percent-encoded. Empty ids and dot segments
/// would change which endpoint is addressed and are refused.
pub(crate) fn path_segment(id: &str) -> Result<String> {
    match id.trim() {
        "" | "." | ".." => Err(MarketError::InvalidInput(format!(
            "invalid identifier {id:?}"
        ))),
        _ => Ok(urlencoding::encode(id).into_owned()),
    }
}

/// `Some(message)` for a 2xx envelope reporting `"success": false`.
fn envelope_failure(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    match obj.get("success") {
        Some(Value::Bool(false)) => {
            Some(error_message(value).unwrap_or_else(|| "request unsuccessful".to_string()))
        }
        _ => None,
    }
}

/// Pull a human-readable message from an error body.
///
/// Looks at `message`, `title`, `error`, then the first entry of an
/// `errors` map/array; a plain-text body is used as is.
fn error_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => {
            for field in ["message", "title", "error"] {
                if let Some(Value::String(s)) = obj.get(field) {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            match obj.get("errors") {
                Some(Value::Object(errors)) => errors.values().find_map(first_string),
                Some(Value::Array(errors)) => errors.iter().find_map(first_string),
                _ => None,
            }
        }
        _ => None,
    }
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

/// Decode a response body into `T`, unwrapping the envelope if present.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    let payload = if is_envelope(&value) {
        match value {
            Value::Object(mut obj) => obj.remove("data").unwrap_or(Value::Null),
            other => other,
        }
    } else {
        value
    };
    serde_json::from_value(payload).map_err(MarketError::from)
}
