use crate::allocation::{RepositoryError, RoundError};
use crate::config::ConfigError;
use crate::import::ImportError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Top-level error for the command line and server entry points.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Round(RoundError),
    Import(ImportError),
    Repository(RepositoryError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Round(err) => write!(f, "round error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
            AppError::Repository(err) => write!(f, "store error: {}", err),
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
            AppError::Round(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::Repository(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Import(_) => StatusCode::BAD_REQUEST,
            AppError::Round(err) => match err {
                RoundError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RoundError::MissingDecisions { .. }
                | RoundError::RoundInProgress
                | RoundError::RoundSuperseded { .. } => StatusCode::CONFLICT,
                RoundError::InvalidRound { .. } | RoundError::ResetRejected { .. } => {
                    StatusCode::BAD_REQUEST
                }
                RoundError::NotGenerated { .. } => StatusCode::NOT_FOUND,
                RoundError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
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

impl From<RoundError> for AppError {
    fn from(value: RoundError) -> Self {
        Self::Round(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::DecisionSource;

    #[test]
    fn round_errors_map_to_http_statuses() {
        let missing = AppError::from(RoundError::MissingDecisions {
            round: 2,
            missing: vec![DecisionSource::Consolidated],
        });
        assert_eq!(missing.status(), StatusCode::CONFLICT);
        assert!(missing.to_string().contains("consolidated report"));

        let store = AppError::from(RoundError::Persistence(RepositoryError::Locked));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let import = AppError::from(ImportError::MissingColumn {
            file: "roster",
            column: "COAP",
        });
        assert_eq!(import.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
