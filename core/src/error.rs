//! Error types for the clinic API client.
//!
//! # Design
//! Two failure classes are kept apart on purpose: `Http` is a non-2xx
//! response (the server answered and refused), `InvalidJson` is a 2xx
//! response whose body could not be parsed (the server broke its contract).
//! Everything that never reached a status line lands in `Network`.
//!
//! Resource modules and the query cache propagate `ApiError` unchanged. The
//! user-facing Spanish wrappers live next to the services that raise them
//! (`NotesError`, `AuthError`).

use serde_json::Value;

/// Code attached to a 2xx response whose body is not valid JSON.
pub const INVALID_JSON_CODE: &str = "INVALID_JSON";

/// Errors returned by `ApiClient` and everything built on top of it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server returned a status outside the 2xx range.
    #[error("{}", http_message(.status, .status_text, .message))]
    Http {
        status: u16,
        status_text: String,
        /// `message` from the JSON error envelope, when the body had one.
        message: Option<String>,
        /// `code` from the JSON error envelope.
        code: Option<String>,
        /// `details` from the JSON error envelope.
        details: Option<Value>,
    },

    /// A 2xx response whose body is not parseable JSON.
    #[error("Invalid JSON response from server")]
    InvalidJson { status: u16, reason: String },

    /// Valid JSON that does not match the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload or query parameters could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The request never produced a response (connect, DNS, body read).
    #[error("network error: {0}")]
    Network(String),
}

fn http_message(status: &u16, status_text: &str, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("HTTP {status}: {status_text}"),
    }
}

impl ApiError {
    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } | ApiError::InvalidJson { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable code. Non-2xx responses without an envelope code
    /// fall back to the status number.
    pub fn code(&self) -> Option<String> {
        match self {
            ApiError::Http { status, code, .. } => {
                Some(code.clone().unwrap_or_else(|| status.to_string()))
            }
            ApiError::InvalidJson { .. } => Some(INVALID_JSON_CODE.to_string()),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Http { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// The message a caller would show; identical to `Display`.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The message the server put in its error envelope, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404) && matches!(self, ApiError::Http { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401) && matches!(self, ApiError::Http { .. })
    }

    pub fn is_invalid_json(&self) -> bool {
        matches!(self, ApiError::InvalidJson { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::Network(error.to_string())
    }
}
