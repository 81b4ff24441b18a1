// Main entry point for the manga bubble translation service

use manga_bubble_translator::{
    core::Config, create_app, utils::Metrics, AppState, Collaborators, PipelineOrchestrator,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_bubble_translator={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANGA BUBBLE TRANSLATOR ===");
    info!(
        "Config: detector={} ocr={} fonts={} pool={} conf={:.2} iou={:.2}",
        config.models.detector_model_path.display(),
        config.models.ocr_model_dir.display(),
        config.fonts.fonts_dir.display(),
        config.onnx_pool_size(),
        config.confidence_threshold(),
        config.iou_threshold()
    );

    // Initialize metrics
    let metrics = Metrics::new();

    info!("Loading models and fonts...");
    let services = Collaborators::production(&config, &metrics)?;
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        Arc::clone(&config),
        services,
        metrics.clone(),
    ));

    let app = create_app(AppState {
        config: Arc::clone(&config),
        orchestrator,
        metrics,
    });

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                         - Root endpoint");
    info!("  GET  /health                   - Health check");
    info!("  GET  /metrics                  - Prometheus metrics");
    info!("  GET  /stats                    - Detailed statistics");
    info!("  POST /api/translate            - Translate a page (multipart/form-data)");
    info!("  GET  /api/fonts                - Selectable fonts");
    info!("  GET  /api/translation-methods  - Selectable translation backends");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
