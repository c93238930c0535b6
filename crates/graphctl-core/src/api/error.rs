//! Errors from Graph REST calls.
//!
//! Graph reports failures as `{"error": {"code": "...", "message": "..."}}`.
//! The code (e.g. `itemNotFound`, `ErrorAccessDenied`) is kept so callers
//! can match on it; bodies that are not in that shape are kept as text.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::utils::truncate_body;

/// Maximum characters of a non-Graph body kept in an error.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// A Graph error reply: HTTP status plus the service's own code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFailure {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for GraphFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (false, false) => write!(f, "{} ({}): {}", self.code, self.status, self.message),
            (false, true) => write!(f, "{} ({})", self.code, self.status),
            (true, _) => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// 401: the token was rejected. Logging in again usually helps.
    #[error("Graph rejected the access token: {0}")]
    TokenRejected(GraphFailure),

    /// 403: the token is valid but lacks a scope or the caller lacks access.
    #[error("Graph denied the request: {0}")]
    Forbidden(GraphFailure),

    #[error("Graph resource not found: {0}")]
    NotFound(GraphFailure),

    /// 429 after the client's own retries ran out.
    #[error("Graph throttled the request: {0}")]
    Throttled(GraphFailure),

    #[error("Graph request failed: {0}")]
    Request(GraphFailure),

    #[error("Graph service error: {0}")]
    Service(GraphFailure),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorDetail,
}

#[derive(Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    /// Classify a non-success reply by status and Graph error body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let failure = match serde_json::from_str::<GraphErrorEnvelope>(body) {
            Ok(envelope) => GraphFailure {
                status: status.as_u16(),
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => GraphFailure {
                status: status.as_u16(),
                code: String::new(),
                message: truncate_body(body.trim(), MAX_ERROR_BODY_LENGTH),
            },
        };

        match status {
            StatusCode::UNAUTHORIZED => ApiError::TokenRejected(failure),
            StatusCode::FORBIDDEN => ApiError::Forbidden(failure),
            StatusCode::NOT_FOUND => ApiError::NotFound(failure),
            StatusCode::TOO_MANY_REQUESTS => ApiError::Throttled(failure),
            s if s.is_server_error() => ApiError::Service(failure),
            _ => ApiError::Request(failure),
        }
    }

    /// The Graph error code, when the reply carried one.
    pub fn graph_code(&self) -> Option<&str> {
        match self {
            ApiError::TokenRejected(f)
            | ApiError::Forbidden(f)
            | ApiError::NotFound(f)
            | ApiError::Throttled(f)
            | ApiError::Request(f)
            | ApiError::Service(f) => Some(f.code.as_str()).filter(|c| !c.is_empty()),
            _ => None,
        }
    }

    /// Whether signing in again could fix this error.
    pub fn needs_login(&self) -> bool {
        match self {
            ApiError::TokenRejected(_) => true,
            ApiError::Auth(e) => e.needs_login(),
            _ => false,
        }
    }
}
