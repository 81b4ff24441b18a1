pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{crop, decode_page, decode_page_async, encode_png, encode_png_async, paste};
pub use metrics::{Metrics, MetricsSnapshot, Stage};
