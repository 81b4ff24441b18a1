pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ApiError, ConfigError, PipelineError, TranslationError};
pub use types::{
    BubbleContour, BubbleRegion, CleanedBubble, FontSelection, TranslateRequest,
    TranslationMethod,
};
