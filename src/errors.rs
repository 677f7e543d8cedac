use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("a user with this email already exists")]
    DuplicateEmail,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("unknown waste category: {0}")]
    InvalidCategory(String),

    #[error("weight must be a positive number of kilograms, got {0}")]
    InvalidWeight(f64),

    #[error("classification failed: {0}")]
    ClassificationFailed(String),

    #[error("chat failed: {0}")]
    ChatFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("a request for this session is already in flight")]
    RequestInFlight,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn storage(err: impl std::error::Error) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateEmail | AppError::RequestInFlight => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            AppError::InvalidCategory(_) | AppError::InvalidWeight(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ClassificationFailed(_) | AppError::ChatFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::BackendUnavailable(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::DuplicateEmail => "duplicate_email",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidCategory(_) => "invalid_category",
            AppError::InvalidWeight(_) => "invalid_weight",
            AppError::ClassificationFailed(_) => "classification_failed",
            AppError::ChatFailed(_) => "chat_failed",
            AppError::BackendUnavailable(_) => "backend_unavailable",
            AppError::NotLoggedIn => "not_logged_in",
            AppError::RequestInFlight => "request_in_flight",
            AppError::BadRequest(_) => "bad_request",
            AppError::Storage(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            AppError::Storage(_) | AppError::Internal(_) => {
                error!(error = %self, "request failed");
                None
            }
            _ => Some(self.to_string()),
        };
        let body = ErrorResponse {
            error: self.code(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
