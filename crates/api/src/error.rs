//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rds_engine::AnalysisError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Handler error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Query parameter outside its allowed range
    #[error("{0}")]
    Validation(String),

    /// Malformed multipart body
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(AnalysisError::InvalidRequest(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Analysis(e) => {
                error!(stage = e.stage(), error = %e, "Analysis failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, axum::Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
