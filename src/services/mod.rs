pub mod bubble;
pub mod detection;
pub mod ocr;
pub mod onnx_builder; // Shared ONNX session construction and pooling
pub mod rendering;
pub mod translation;

// Re-export commonly used services
pub use bubble::{BubbleProcessor, ContourBubbleProcessor};
pub use detection::{BubbleDetector, DetectionService};
pub use ocr::{OcrService, TextRecognizer};
pub use rendering::{CosmicTextCompositor, TextCompositor};
pub use translation::{BackendTranslator, TranslationCache, Translator};
