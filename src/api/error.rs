use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::ForecastError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forecast(e) if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Forecast(ForecastError::DataSource { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Forecast(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Forecast(e) => match e {
                ForecastError::InsufficientHistory { .. } => "InsufficientHistory",
                ForecastError::ScalerMismatch { .. } => "ScalerMismatch",
                ForecastError::DataSource { .. } => "DataSourceUnavailable",
                ForecastError::Persistence { .. } => "PersistenceError",
                ForecastError::Regressor { .. } => "RegressorError",
            },
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %self, "Service unavailable");
            self.to_string()
        } else if status.is_server_error() {
            tracing::error!(error = %self, "API error occurred");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, "Client error");
            self.to_string()
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{error:#}"))
    }
}
