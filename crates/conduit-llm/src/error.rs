use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Failure category shared by every component of the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials missing or rejected
    Auth,
    /// Request rejected before or by the upstream as malformed
    Validation,
    /// Upstream throttled the request
    RateLimit,
    /// Connection, timeout or upstream 5xx failure
    TransientNetwork,
    /// Provider or model is not registered
    NotFound,
    /// Model called a tool nobody provides
    ToolNotFound,
    /// A tool provider failed while executing
    ToolExecutionError,
    /// Tool-call loop exceeded the configured continuation bound
    ContinuationLimit,
    Unknown,
}

impl ErrorKind {
    /// Kinds that must never be retried
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Auth | Self::Validation | Self::NotFound)
    }

    const fn retryable_by_default(self) -> bool {
        matches!(self, Self::RateLimit | Self::TransientNetwork)
    }
}

/// Typed error returned by transport clients, the registry and the gateway
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create an error with the default retry classification of `kind`
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retryable: kind.retryable_by_default(),
            retry_after: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ErrorKind::RateLimit, message)
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(ErrorKind::ToolNotFound, format!("tool not found: {name}"))
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolExecutionError, message)
    }

    pub fn continuation_limit(limit: u32) -> Self {
        Self::new(
            ErrorKind::ContinuationLimit,
            format!("model kept requesting tools after {limit} continuation turn(s)"),
        )
    }

    /// Attach the upstream HTTP status
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the retry classification
    ///
    /// Terminal kinds stay non-retryable regardless of `retryable`.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable && !self.kind.is_terminal();
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Minimum wait the upstream asked for before retrying
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Classify a non-success upstream response
    ///
    /// The provider's own error message is extracted from the body when it
    /// follows the `{"error": {"message": ...}}` shape all three protocols use.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let detail = upstream_message(body).unwrap_or_else(|| truncate(body, 512));
        let message = format!("upstream returned {status}: {detail}");

        let error = match status.as_u16() {
            401 | 403 => Self::auth(message),
            400 | 413 | 422 => Self::validation(message),
            404 => Self::not_found(message),
            429 => Self::rate_limited(message, retry_after),
            408 | 500..=599 => Self::transient(message),
            _ => Self::unknown(message),
        };

        error.with_status(status.as_u16())
    }

    /// HTTP status a client of the gateway should see
    pub const fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::ToolNotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::TransientNetwork => StatusCode::BAD_GATEWAY,
            ErrorKind::ToolExecutionError | ErrorKind::ContinuationLimit | ErrorKind::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// `OpenAI`-style `error.type` string
    pub const fn error_type(&self) -> &'static str {
        match self.kind {
            ErrorKind::Auth => "authentication_error",
            ErrorKind::Validation => "invalid_request_error",
            ErrorKind::NotFound | ErrorKind::ToolNotFound => "not_found_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::TransientNetwork => "upstream_error",
            ErrorKind::ToolExecutionError => "tool_error",
            ErrorKind::ContinuationLimit => "continuation_limit_error",
            ErrorKind::Unknown => "internal_error",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        let base = if error.is_decode() {
            Self::unknown(format!("failed to decode upstream response: {error}"))
        } else if error.is_timeout() {
            Self::transient(format!("upstream timed out: {error}"))
        } else if error.is_connect() || error.is_request() || error.is_body() {
            Self::transient(format!("upstream connection failed: {error}"))
        } else {
            Self::unknown(error.to_string())
        };

        match error.status() {
            Some(status) => base.with_status(status.as_u16()),
            None => base,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error.message)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
