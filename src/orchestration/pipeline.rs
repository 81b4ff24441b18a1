// Pipeline orchestrator: one uploaded page in, one translated PNG out

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{
    FontSelection, PipelineSummary, TranslateRequest, TranslationMethod,
};
use crate::services::bubble::{BubbleProcessor, ContourBubbleProcessor};
use crate::services::detection::{BubbleDetector, DetectionService};
use crate::services::ocr::{OcrService, TextRecognizer};
use crate::services::rendering::{CosmicTextCompositor, TextCompositor};
use crate::services::translation::{BackendTranslator, Translator};
use crate::utils::image_ops::{crop, decode_page_async, encode_png_async, paste, to_dynamic};
use crate::utils::metrics::{Metrics, Stage};

/// The five services a pipeline run calls into
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn BubbleDetector>,
    pub processor: Arc<dyn BubbleProcessor>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub translator: Arc<dyn Translator>,
    pub compositor: Arc<dyn TextCompositor>,
}

impl Collaborators {
    /// Load the production models, fonts and translation backends
    pub fn production(config: &Arc<Config>, metrics: &Metrics) -> Result<Self> {
        let detector = DetectionService::new(Arc::clone(config))?;
        let recognizer = OcrService::new(&config.models.ocr_model_dir, config.onnx_pool_size())?;
        let translator = BackendTranslator::from_config(&config.translation, Some(metrics.clone()))?;

        let compositor = CosmicTextCompositor::new();
        let font_paths: Vec<_> = FontSelection::ALL
            .iter()
            .map(|font| config.font_path(*font))
            .collect();
        compositor.preload(font_paths.iter().map(|p| p.as_path()));

        info!("✓ Detection backend: {}", detector.device_type());

        Ok(Self {
            detector: Arc::new(detector),
            processor: Arc::new(ContourBubbleProcessor::new()),
            recognizer: Arc::new(recognizer),
            translator: Arc::new(translator),
            compositor: Arc::new(compositor),
        })
    }
}

pub struct PipelineOrchestrator {
    config: Arc<Config>,
    services: Collaborators,
    metrics: Metrics,
}

/// Run CPU-bound work off the async runtime
async fn run_blocking<T, F>(f: F) -> PipelineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))
}

impl PipelineOrchestrator {
    pub fn new(config: Arc<Config>, services: Collaborators, metrics: Metrics) -> Self {
        Self {
            config,
            services,
            metrics,
        }
    }

    /// Font keys accepted by `translate`
    pub fn list_fonts(&self) -> Vec<&'static str> {
        FontSelection::keys()
    }

    /// Translation method keys accepted by `translate`
    pub fn list_translation_methods(&self) -> Vec<&'static str> {
        TranslationMethod::keys()
    }

    async fn timed<T, Fut>(&self, stage: Stage, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let out = fut.await;
        self.metrics.record_stage(stage, start.elapsed());
        out
    }

    /// Translate every bubble on the page and return the composited page as PNG.
    ///
    /// Any collaborator failure aborts the whole run; nothing partial is returned.
    #[instrument(skip(self, request), fields(
        filename = %request.filename,
        method = %request.method,
        font = %request.font,
        bytes = request.image_bytes.len(),
    ))]
    pub async fn translate(&self, request: TranslateRequest) -> PipelineResult<Vec<u8>> {
        let start = Instant::now();
        let result = self.run(request).await;

        match &result {
            Ok((png, summary)) => {
                self.metrics.record_request_success();
                info!(
                    "✓ Translated page: {} bubbles detected, {} rendered, {} skipped, {} bytes in {:.2}s",
                    summary.bubbles_detected,
                    summary.bubbles_rendered,
                    summary.bubbles_skipped,
                    png.len(),
                    start.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                self.metrics.record_request_failure();
                error!("Translation pipeline failed: {}", e);
            }
        }

        result.map(|(png, _)| png)
    }

    async fn run(&self, request: TranslateRequest) -> PipelineResult<(Vec<u8>, PipelineSummary)> {
        let TranslateRequest {
            image_bytes,
            method,
            font,
            ..
        } = request;
        let font_path = self.config.font_path(font);

        let page = self
            .timed(Stage::Decode, decode_page_async(image_bytes))
            .await
            .map_err(PipelineError::DecodeFailed)?;
        let (width, height) = page.dimensions();
        debug!("Decoded page {}x{}", width, height);

        let detector = Arc::clone(&self.services.detector);
        let (page, regions) = self
            .timed(
                Stage::Detect,
                run_blocking(move || {
                    let dynamic = to_dynamic(page);
                    let regions = detector.detect(&dynamic);
                    (dynamic.into_rgb8(), regions)
                }),
            )
            .await?;
        let regions = regions.map_err(PipelineError::DetectionFailed)?;

        let mut summary = PipelineSummary {
            bubbles_detected: regions.len(),
            ..Default::default()
        };
        debug!("{} bubbles detected", regions.len());

        // Crops always come from the untouched page; rendered bubbles go to `canvas`
        let mut canvas = page.clone();

        for (bubble_index, region) in regions.iter().enumerate() {
            let Some(bounds) = region.crop_bounds(width, height) else {
                warn!(
                    "Skipping bubble {}: region [{:.1}, {:.1}, {:.1}, {:.1}] has no area inside the page",
                    bubble_index, region.x1, region.y1, region.x2, region.y2
                );
                summary.bubbles_skipped += 1;
                self.metrics.record_bubble_skipped();
                continue;
            };
            let bubble_crop = crop(&page, bounds);

            let recognizer = Arc::clone(&self.services.recognizer);
            let ocr_input = to_dynamic(bubble_crop.clone());
            let text = self
                .timed(
                    Stage::Recognize,
                    run_blocking(move || recognizer.recognize(&ocr_input)),
                )
                .await?
                .map_err(|source| PipelineError::RecognitionFailed {
                    bubble_index,
                    source,
                })?;

            let processor = Arc::clone(&self.services.processor);
            let cleaned = self
                .timed(
                    Stage::Process,
                    run_blocking(move || processor.process(&bubble_crop)),
                )
                .await?
                .map_err(|source| PipelineError::BubbleProcessingFailed {
                    bubble_index,
                    source,
                })?;

            let translated = self
                .timed(
                    Stage::Translate,
                    self.services.translator.translate(&text, method),
                )
                .await
                .map_err(|source| PipelineError::TranslationFailed {
                    bubble_index,
                    source,
                })?;
            debug!("Bubble {}: '{}' -> '{}'", bubble_index, text, translated);

            let compositor = Arc::clone(&self.services.compositor);
            let font_path = font_path.clone();
            let rendered = self
                .timed(
                    Stage::Compose,
                    run_blocking(move || compositor.compose(&cleaned, &translated, &font_path)),
                )
                .await?
                .map_err(|source| PipelineError::CompositingFailed {
                    bubble_index,
                    source,
                })?;

            paste(&mut canvas, &rendered, bounds.0, bounds.1);
            summary.bubbles_rendered += 1;
            self.metrics.record_bubble_processed();
        }

        let png = self
            .timed(Stage::Encode, encode_png_async(canvas))
            .await
            .map_err(PipelineError::EncodeFailed)?;

        Ok((png, summary))
    }
}
