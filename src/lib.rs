// Library exports for the manga bubble translation service

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{ApiError, ConfigError, PipelineError, TranslationError},
    types::{BubbleRegion, CleanedBubble, FontSelection, TranslateRequest, TranslationMethod},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{Collaborators, PipelineOrchestrator};

pub use server::{create_app, AppState};

pub use services::{
    BackendTranslator, BubbleDetector, BubbleProcessor, ContourBubbleProcessor,
    CosmicTextCompositor, DetectionService, OcrService, TextCompositor, TextRecognizer,
    TranslationCache, Translator,
};

pub use utils::Metrics;
