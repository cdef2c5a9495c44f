use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use shared::models::ValidationError;
use thiserror::Error;
use tracing::error;

use super::problem::ProblemDetails;
use crate::services::RepositoryError;

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }

        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = self.details {
            problem = problem.with_details(details);
        }
        problem.into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err
                .code()
                .unwrap_or(std::borrow::Cow::Borrowed("unknown"));
            return Self::internal_server_error(format!("database error {code}"))
                .with_details(json!({ "sqlstate": code }));
        }
        Self::internal_server_error(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(message) => Self::validation(message),
            RepositoryError::NotFound(message) => Self::not_found(message),
            RepositoryError::Database(db_err) => Self::from(db_err),
        }
    }
}
