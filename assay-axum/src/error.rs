use assay::AssayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<AssayError> for AuthError {
    fn from(err: AssayError) -> Self {
        match err {
            AssayError::StorageError(msg) => AuthError::StoreUnavailable(msg),
            AssayError::SessionError(msg) => AuthError::InternalError(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::StoreUnavailable(ref msg) => {
                tracing::error!(error = %msg, "Session store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable")
            }
            AuthError::InternalError(ref msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
