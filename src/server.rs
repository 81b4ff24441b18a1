// HTTP surface: translate endpoint, capability lists, health and metrics

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::errors::ApiError;
use crate::core::types::{
    FontSelection, FontsResponse, TranslateRequest, TranslationMethod, TranslationMethodsResponse,
};
use crate::orchestration::PipelineOrchestrator;
use crate::utils::Metrics;

const NO_IMAGE: &str = "No image file provided";
const NO_FILENAME: &str = "No selected file";
const RESULT_FILENAME: &str = "translated_manga.png";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub metrics: Metrics,
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/api/translate", post(translate))
        .route("/api/fonts", get(list_fonts))
        .route("/api/translation-methods", get(list_translation_methods))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
}

async fn root() -> &'static str {
    "Manga Bubble Translator"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    serde_json::to_value(state.metrics.snapshot())
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize metrics: {}", e),
            )
        })
}

async fn list_fonts(State(state): State<AppState>) -> Json<FontsResponse> {
    Json(FontsResponse {
        fonts: state
            .orchestrator
            .list_fonts()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

async fn list_translation_methods(State(state): State<AppState>) -> Json<TranslationMethodsResponse> {
    Json(TranslationMethodsResponse {
        translation_methods: state
            .orchestrator
            .list_translation_methods()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// Raw form contents before validation
#[derive(Debug, Default)]
struct TranslateForm {
    image: Option<(String, Vec<u8>)>,
    translation_method: Option<String>,
    font: Option<String>,
}

impl TranslateForm {
    /// Read every field. A body that is not multipart reads as an empty form;
    /// a multipart stream that fails partway is an error.
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(e) => {
                debug!("Request is not a usable multipart body: {}", e);
                return Ok(form);
            }
        };

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            warn!("Multipart error: {}", e);
            ApiError::from(e)
        })? {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(str::to_string);

            match (name.as_str(), file_name) {
                // Only a file part counts as the upload, and only the first one
                ("image", Some(file_name)) if form.image.is_none() => {
                    let data = field.bytes().await.map_err(|e| {
                        warn!("Failed to read uploaded image: {}", e);
                        ApiError::from(e)
                    })?;
                    form.image = Some((file_name, data.to_vec()));
                }
                ("translation_method", None) if form.translation_method.is_none() => {
                    form.translation_method = Some(field.text().await?);
                }
                ("font", None) if form.font.is_none() => {
                    form.font = Some(field.text().await?);
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// Checks run in order: upload present, filename, method, font
    fn validate(self) -> Result<TranslateRequest, ApiError> {
        let (filename, image_bytes) = self
            .image
            .ok_or_else(|| ApiError::BadRequest(NO_IMAGE.to_string()))?;

        if filename.is_empty() {
            return Err(ApiError::BadRequest(NO_FILENAME.to_string()));
        }

        let method = match self.translation_method {
            Some(key) => key
                .parse::<TranslationMethod>()
                .map_err(|_| ApiError::BadRequest(TranslationMethod::invalid_message()))?,
            None => TranslationMethod::DEFAULT,
        };

        let font = match self.font {
            Some(key) => key
                .parse::<FontSelection>()
                .map_err(|_| ApiError::BadRequest(FontSelection::invalid_message()))?,
            None => FontSelection::DEFAULT,
        };

        Ok(TranslateRequest {
            filename,
            image_bytes,
            method,
            font,
        })
    }
}

/// Translate endpoint
///
/// # Request Format:
/// - multipart/form-data
/// - Field "image": the page (any format the decoder sniffs)
/// - Field "translation_method" (optional): google | hf | baidu | bing
/// - Field "font" (optional): animeace_i | mangati | ariali
///
/// # Response:
/// - PNG attachment `translated_manga.png`, or `{"error": ...}`
async fn translate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = TranslateForm::read(multipart)
        .await
        .and_then(TranslateForm::validate)
        .map_err(|e| {
            state.metrics.record_request_rejected();
            info!("Rejected translate request: {}", e);
            e
        })?;

    info!(
        "Received translate request: {} ({} bytes, method={}, font={})",
        request.filename,
        request.image_bytes.len(),
        request.method,
        request.font
    );

    let png = state.orchestrator.translate(request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", RESULT_FILENAME),
            ),
        ],
        png,
    )
        .into_response())
}
