//! Client error taxonomy

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// The `request` echo some API error bodies carry.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub query_string: String,
    #[serde(default)]
    pub method: String,
}

/// A structured error body returned by the API, plus the HTTP status it
/// arrived with.
#[derive(Debug, Clone, Deserialize, Error)]
#[error("API error {status}: {error} ({error_description})")]
pub struct ApiError {
    /// HTTP status; not part of the body, filled in after parsing.
    #[serde(skip)]
    pub status: u16,
    /// Machine-readable error code
    #[serde(default)]
    pub error: String,
    /// Human-readable description
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub error_detail: Option<String>,
    #[serde(default)]
    pub error_propagate: bool,
    /// Per-field details, when the API provides them
    #[serde(default)]
    pub error_parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub request: Option<ErrorRequest>,
}

impl ApiError {
    /// Whether this error means the session is invalid or expired, which
    /// drives the client's transparent re-authentication.
    pub fn is_auth_error(&self) -> bool {
        if self.status == 401 {
            return true;
        }
        if self.error == "unauthorized" && self.error_description == "expired_token" {
            return true;
        }
        self.status == 400
            && (self.error == "invalid_grant"
                || (self.error == "invalid_client" && self.error_description == "invalid_auth"))
    }
}

/// Errors surfaced by [`crate::Client`] request tasks
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server returned a structured error body
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request timed out with no response
    #[error("no response: request timed out")]
    NoResponse,

    /// Could not reach the host at all
    #[error("connection failed: {0}")]
    Connection(String),

    /// Generic transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status whose body was not a structured API error
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A request URI could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be decoded into the requested type
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    /// Classify a transport-level failure from the HTTP stack.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::NoResponse
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }

    /// Build the error for a non-success response. A malformed body never
    /// fails the pipeline; it degrades to [`ClientError::Http`] with the
    /// raw status.
    pub(crate) fn from_error_body(status: u16, body: String) -> Self {
        match serde_json::from_str::<ApiError>(&body) {
            Ok(mut api) => {
                api.status = status;
                ClientError::Api(api)
            }
            Err(_) => ClientError::Http { status, body },
        }
    }

    /// Whether the auth-retry policy applies to this error.
    pub fn is_auth_error(&self) -> bool {
        match self {
            ClientError::Api(api) => api.is_auth_error(),
            ClientError::Http { status: 401, .. } => true,
            _ => false,
        }
    }

    /// Whether the ordinary retry/backoff loop may try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::NoResponse | ClientError::Connection(_) | ClientError::Network(_) => true,
            ClientError::Api(api) => api.status >= 500 || api.status == 429,
            ClientError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
