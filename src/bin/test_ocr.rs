//! Run the OCR model on a single bubble crop
//! Run with: cargo run --release --bin test_ocr -- <image_path> [model_dir]

use anyhow::{Context, Result};
use manga_bubble_translator::services::ocr::{OcrService, TextRecognizer};
use std::path::Path;
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("manga_bubble_translator::services::ocr=debug")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let sample_path = args.get(1).map(String::as_str).unwrap_or("test_sample.png");
    let model_dir = args.get(2).map(String::as_str).unwrap_or("models/ocr");

    if !Path::new(sample_path).exists() {
        eprintln!("Image not found: {}", sample_path);
        std::process::exit(1);
    }

    info!("Loading image: {}", sample_path);
    let image = image::open(sample_path).with_context(|| format!("Failed to open {}", sample_path))?;
    info!("Image dimensions: {}x{}", image.width(), image.height());

    info!("Initializing OCR service from: {}", model_dir);
    let ocr_service = OcrService::new(Path::new(model_dir), 1)?;

    let start = Instant::now();
    let text = ocr_service.recognize(&image)?;

    println!("\n=== Results ({:.0}ms) ===", start.elapsed().as_secs_f64() * 1000.0);
    if text.is_empty() {
        println!("  (empty)");
    } else {
        println!("  {}", text);
    }

    Ok(())
}
