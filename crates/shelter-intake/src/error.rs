use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::profiles::lifecycle::LifecycleError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Payload(serde_json::Error),
    Lifecycle(LifecycleError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Payload(err) => write!(f, "invalid profile payload: {}", err),
            AppError::Lifecycle(err) => write!(f, "lifecycle error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Payload(err) => Some(err),
            AppError::Lifecycle(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Payload(_) => StatusCode::BAD_REQUEST,
            AppError::Lifecycle(err) => err.status_code(),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Payload(value)
    }
}

impl From<LifecycleError> for AppError {
    fn from(value: LifecycleError) -> Self {
        Self::Lifecycle(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::profiles::domain::{ProfileId, ProfileStatus};

    #[test]
    fn lifecycle_errors_keep_their_http_status() {
        let response = AppError::from(LifecycleError::InvalidTransition {
            from: ProfileStatus::Draft,
            to: ProfileStatus::Published,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response =
            AppError::from(LifecycleError::NotFound(ProfileId("gone".to_string()))).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_payloads_are_bad_requests() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            AppError::from(err).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
