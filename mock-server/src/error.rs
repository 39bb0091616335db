use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// `{message, code, details?}` body sent with every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Token inválido o ausente")]
    Unauthorized,
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,
    #[error("No tienes permiso para esta operación")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },
}

impl ServerError {
    pub fn conflict(code: &'static str, message: &str, details: Value) -> Self {
        ServerError::Conflict {
            code,
            message: message.to_string(),
            details: Some(details),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ServerError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            ServerError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ServerError::Conflict { code, .. } => (StatusCode::CONFLICT, code),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        tracing::debug!(status = status.as_u16(), code, error = %self, "request rejected");
        let details = match &self {
            ServerError::Conflict { details, .. } => details.clone(),
            _ => None,
        };
        let body = ErrorBody {
            message: self.to_string(),
            code,
            details,
        };
        (status, Json(body)).into_response()
    }
}
