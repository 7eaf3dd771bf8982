use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::retry::{classify, Classification};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// An AI call failed. `action` is the user-facing description of what failed.
    #[error("{action} ({source})")]
    Llm {
        action: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("{0} (deadline exceeded)")]
    DeadlineExceeded(&'static str),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn llm(action: &'static str, source: LlmError) -> Self {
        AppError::Llm { action, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Llm { action, source } => {
                tracing::error!("LLM error: {action}: {source}");
                match classify(source) {
                    // Retry budget exhausted on a transient failure.
                    Classification::Retryable => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "AI_UNAVAILABLE",
                        "The AI service is busy, please try again shortly".to_string(),
                    ),
                    Classification::Terminal => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "LLM_ERROR",
                        action.to_string(),
                    ),
                }
            }
            AppError::DeadlineExceeded(action) => {
                tracing::error!("AI request deadline exceeded: {action}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "DEADLINE_EXCEEDED",
                    action.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
