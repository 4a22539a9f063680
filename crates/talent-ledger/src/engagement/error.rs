use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use super::repository::{CollaboratorError, RepositoryError};

/// Machine-readable classification returned alongside every rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    AuthorizationError,
    StateConflict,
    NotFound,
    TransientStorageError,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::AuthorizationError => "authorization_error",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientStorageError => "transient_storage_error",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::AuthorizationError => StatusCode::FORBIDDEN,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::TransientStorageError => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error raised by the lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    StateConflict(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
    #[error("collaborator failure: {0}")]
    Collaborator(CollaboratorError),
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::StateConflict(reason.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::ValidationError,
            EngineError::Unauthorized(_) => ErrorKind::AuthorizationError,
            EngineError::StateConflict(_) => ErrorKind::StateConflict,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Storage(RepositoryError::NotFound) => ErrorKind::NotFound,
            EngineError::Storage(RepositoryError::Conflict) => ErrorKind::StateConflict,
            EngineError::Storage(RepositoryError::Unavailable(_)) => {
                ErrorKind::TransientStorageError
            }
            EngineError::Collaborator(CollaboratorError::UnknownPosting(_)) => ErrorKind::NotFound,
            EngineError::Collaborator(CollaboratorError::Unavailable(_)) => {
                ErrorKind::TransientStorageError
            }
        }
    }

    /// Infrastructure failures only; business rejections are never retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStorageError
    }
}

impl From<CollaboratorError> for EngineError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::UnknownPosting(id) => Self::not_found("posting", id),
            other => Self::Collaborator(other),
        }
    }
}

/// Undecodable request bodies are input errors like any other.
impl From<JsonRejection> for EngineError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = axum::Json(json!({
            "kind": kind.code(),
            "error": self.to_string(),
        }));
        (kind.status(), body).into_response()
    }
}
