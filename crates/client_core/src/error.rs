//! Collaborator errors and the classified form that state containers carry.

use std::fmt;

use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Failures raised by collaborators (HTTP API, auth backend, storage).
///
/// These never reach a state container directly; coordinators turn them into
/// [`ErrorInfo`] with [`ErrorInfo::classify`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Backend(ApiError),
    #[error("no authenticated session")]
    NotAuthenticated,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Backend(ApiError::new(code, message))
    }
}

impl From<ApiError> for ClientError {
    fn from(value: ApiError) -> Self {
        Self::Backend(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client-side precondition failed; no external call was made.
    Validation,
    /// Transport failure or timeout.
    Network,
    /// Session missing, invalid or expired.
    Unauthorized,
    /// Structured rejection from the backend (duplicate account, not found, ...).
    Backend,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Unauthorized => "unauthorized",
            Self::Backend => "backend",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// User input a validation failure points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    Email,
    Password,
    Image,
    CoinId,
    Days,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    kind: ErrorKind,
    message: String,
    field: Option<InputField>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
        }
    }

    pub fn validation(field: InputField, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            field: Some(field),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Maps a collaborator failure onto the stable error taxonomy.
    pub fn classify(error: &ClientError) -> Self {
        match error {
            ClientError::Transport(err) => Self::new(classify_transport(err), err.to_string()),
            ClientError::Timeout => Self::new(ErrorKind::Network, "request timed out"),
            ClientError::Backend(api) => Self::new(classify_code(api.code), api.message.clone()),
            ClientError::NotAuthenticated => Self::unauthorized("sign in required"),
            ClientError::InvalidResponse(message) => {
                Self::new(ErrorKind::Unknown, format!("invalid response: {message}"))
            }
            ClientError::Other(err) => {
                let message = format!("{err:#}");
                Self::new(classify_message(&message), message)
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field(&self) -> Option<InputField> {
        self.field
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    pub fn requires_reauth(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ClientError> for ErrorInfo {
    fn from(value: ClientError) -> Self {
        Self::classify(&value)
    }
}

fn classify_code(code: ErrorCode) -> ErrorKind {
    match code {
        ErrorCode::Unauthorized | ErrorCode::Forbidden => ErrorKind::Unauthorized,
        ErrorCode::Validation => ErrorKind::Validation,
        ErrorCode::Unavailable => ErrorKind::Network,
        ErrorCode::NotFound
        | ErrorCode::Conflict
        | ErrorCode::RateLimited
        | ErrorCode::Internal => ErrorKind::Backend,
    }
}

fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    if let Some(status) = err.status() {
        return classify_code(ErrorCode::from_http_status(status.as_u16()));
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::Network
    } else if err.is_decode() {
        ErrorKind::Unknown
    } else {
        ErrorKind::Network
    }
}

/// Best-effort classification for errors that only carry a message.
fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("session expired")
        || lower.contains("invalid token")
        || lower.contains("invalid credential")
    {
        ErrorKind::Unauthorized
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("unavailable")
        || lower.contains("disconnect")
    {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}
