// Error types for the translation service
//
// Each layer gets its own thiserror enum; collaborator seams return anyhow
// so fakes and production services can report failures freely.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failures of a single `/api/translate` pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    DecodeFailed(#[source] anyhow::Error),

    #[error("Bubble detection failed: {0}")]
    DetectionFailed(#[source] anyhow::Error),

    #[error("Text recognition failed for bubble {bubble_index}: {source}")]
    RecognitionFailed {
        bubble_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Bubble processing failed for bubble {bubble_index}: {source}")]
    BubbleProcessingFailed {
        bubble_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Translation failed for bubble {bubble_index}: {source}")]
    TranslationFailed {
        bubble_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Text compositing failed for bubble {bubble_index}: {source}")]
    CompositingFailed {
        bubble_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to encode result image: {0}")]
    EncodeFailed(#[source] anyhow::Error),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Errors raised by translation backends
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("{backend} translation is not configured (set {variable})")]
    MissingCredentials {
        backend: &'static str,
        variable: &'static str,
    },

    #[error("{backend} request failed: {source}")]
    RequestFailed {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} returned HTTP {status}: {body}")]
    HttpStatus {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("{backend} returned an unexpected response: {reason}")]
    InvalidResponse {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} is unavailable (circuit breaker open)")]
    CircuitOpen { backend: &'static str },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),
}

/// Errors surfaced over HTTP as `{"error": <message>}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// The multipart stream itself failed (body limit, truncated part)
    #[error("{message}")]
    Upload { status: StatusCode, message: String },

    #[error(transparent)]
    Processing(#[from] PipelineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload { status, .. } => *status,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
