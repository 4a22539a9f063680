use crate::config::ConfigError;
use crate::engagement::EngineError;
use crate::telemetry::TelemetryError;
use axum::response::{IntoResponse, Response};

/// Process-level failure surfaced by the service binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Engine(err) => err.into_response(),
            other => {
                let body = axum::Json(serde_json::json!({
                    "kind": "internal_error",
                    "error": other.to_string(),
                }));
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::error::Error;

    #[test]
    fn config_failures_keep_their_cause() {
        let err = AppError::from(ConfigError::InvalidPort);
        assert_eq!(
            err.to_string(),
            "configuration error: APP_PORT must be a valid u16"
        );
        assert!(err.source().is_some());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn engine_failures_keep_their_http_mapping() {
        let err = AppError::from(EngineError::conflict("already withdrawn"));
        assert_eq!(err.to_string(), "engine error: already withdrawn");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
