//! HTTP error mapping
//!
//! Client input problems are 400s with the intake message. Model and
//! extraction failures are 500s; extraction failures carry the first 1000
//! characters of the model output so the caller can see what went wrong.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_pipeline::{truncate_raw, ExtractError, IntakeError};
use llm_bridge::GatewayError;
use serde::Serialize;

/// Characters of raw model output returned with extraction failures
pub const RAW_RESPONSE_LIMIT: usize = 1000;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// API-level errors with HTTP status mapping
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    BadRequest(#[from] IntakeError),

    #[error("Model initialization failed")]
    ModelUnavailable(String),

    #[error("Model inference failed: {message}")]
    Inference { message: String },

    #[error("{source}")]
    Extraction {
        source: ExtractError,
        raw_response: String,
    },

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(e) => ErrorBody {
                error: e.to_string(),
                raw_response: None,
            },
            ApiError::ModelUnavailable(_) | ApiError::Internal(_) => ErrorBody {
                error: self.to_string(),
                raw_response: None,
            },
            ApiError::Inference { message } => ErrorBody {
                error: format!("Model inference failed: {message}"),
                raw_response: None,
            },
            ApiError::Extraction {
                source,
                raw_response,
            } => ErrorBody {
                error: match source {
                    ExtractError::Malformed(_) => {
                        "Failed to parse model response as JSON".to_string()
                    }
                    ExtractError::NotFound => format!("Model inference failed: {source}"),
                },
                raw_response: Some(truncate_raw(raw_response, RAW_RESPONSE_LIMIT)),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::BadRequest(e) => tracing::warn!(error = %e, "Rejected request"),
            ApiError::ModelUnavailable(detail) => {
                tracing::error!(detail = %detail, "Model loading failed")
            }
            ApiError::Inference { message } => {
                tracing::error!(message = %message, "Model inference failed")
            }
            ApiError::Extraction { source, .. } => {
                tracing::error!(error = %source, "No usable JSON in model response")
            }
            ApiError::Internal(detail) => tracing::error!(detail = %detail, "Unexpected error"),
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ModelUnavailable { .. } => ApiError::ModelUnavailable(err.to_string()),
            GatewayError::Generation(message) => ApiError::Inference { message },
            GatewayError::Staging(e) => ApiError::Internal(e.to_string()),
        }
    }
}
