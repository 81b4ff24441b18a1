// Deterministic collaborators for pipeline and router tests

use anyhow::Result;
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::types::{BubbleContour, BubbleRegion, CleanedBubble, TranslationMethod};
use crate::orchestration::Collaborators;
use crate::services::bubble::BubbleProcessor;
use crate::services::detection::BubbleDetector;
use crate::services::ocr::TextRecognizer;
use crate::services::rendering::TextCompositor;
use crate::services::translation::Translator;

pub const INK: Rgb<u8> = Rgb([10, 20, 30]);

#[derive(Default)]
pub struct CallCounts {
    pub detect: AtomicUsize,
    pub recognize: AtomicUsize,
    pub process: AtomicUsize,
    pub translate: AtomicUsize,
    pub compose: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        [
            &self.detect,
            &self.recognize,
            &self.process,
            &self.translate,
            &self.compose,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

pub struct FixedDetector {
    pub regions: Vec<BubbleRegion>,
    pub calls: Arc<CallCounts>,
}

impl BubbleDetector for FixedDetector {
    fn detect(&self, _page: &DynamicImage) -> Result<Vec<BubbleRegion>> {
        self.calls.detect.fetch_add(1, Ordering::SeqCst);
        Ok(self.regions.clone())
    }
}

/// Returns `text` for every crop, or fails when `text` is None; keeps every crop it saw
pub struct FixedRecognizer {
    pub text: Option<String>,
    pub seen: Mutex<Vec<RgbImage>>,
    pub calls: Arc<CallCounts>,
}

impl TextRecognizer for FixedRecognizer {
    fn recognize(&self, crop: &DynamicImage) -> Result<String> {
        self.calls.recognize.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(crop.to_rgb8());
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => anyhow::bail!("OCR model exploded"),
        }
    }
}

/// Paints the whole crop white
pub struct WhiteoutProcessor {
    pub calls: Arc<CallCounts>,
}

impl BubbleProcessor for WhiteoutProcessor {
    fn process(&self, crop: &RgbImage) -> Result<CleanedBubble> {
        self.calls.process.fetch_add(1, Ordering::SeqCst);
        let (w, h) = crop.dimensions();
        Ok(CleanedBubble {
            image: RgbImage::from_pixel(w, h, Rgb([255, 255, 255])),
            contour: BubbleContour::full(w, h),
        })
    }
}

pub struct IdentityTranslator {
    pub calls: Arc<CallCounts>,
}

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, text: &str, _method: TranslationMethod) -> Result<String> {
        self.calls.translate.fetch_add(1, Ordering::SeqCst);
        Ok(text.to_string())
    }
}

/// Records every (text, font) it is asked to draw and marks one pixel row per character
pub struct RecordingCompositor {
    pub drawn: Mutex<Vec<(String, PathBuf)>>,
    pub calls: Arc<CallCounts>,
}

impl TextCompositor for RecordingCompositor {
    fn compose(&self, bubble: &CleanedBubble, text: &str, font: &Path) -> Result<RgbImage> {
        self.calls.compose.fetch_add(1, Ordering::SeqCst);
        self.drawn.lock().push((text.to_string(), font.to_path_buf()));

        let mut img = bubble.image.clone();
        let (w, h) = img.dimensions();
        for (row, _) in text.chars().enumerate().take(h as usize) {
            for x in 0..w {
                img.put_pixel(x, row as u32, INK);
            }
        }
        Ok(img)
    }
}

pub struct Harness {
    pub calls: Arc<CallCounts>,
    pub recognizer: Arc<FixedRecognizer>,
    pub compositor: Arc<RecordingCompositor>,
    pub services: Collaborators,
}

/// Fakes wired together; `ocr_text: None` makes recognition fail
pub fn harness(regions: Vec<BubbleRegion>, ocr_text: Option<&str>) -> Harness {
    let calls = Arc::new(CallCounts::default());
    let compositor = Arc::new(RecordingCompositor {
        drawn: Mutex::new(Vec::new()),
        calls: Arc::clone(&calls),
    });

    let recognizer = Arc::new(FixedRecognizer {
        text: ocr_text.map(str::to_string),
        seen: Mutex::new(Vec::new()),
        calls: Arc::clone(&calls),
    });

    let services = Collaborators {
        detector: Arc::new(FixedDetector {
            regions,
            calls: Arc::clone(&calls),
        }),
        processor: Arc::new(WhiteoutProcessor {
            calls: Arc::clone(&calls),
        }),
        recognizer: recognizer.clone(),
        translator: Arc::new(IdentityTranslator {
            calls: Arc::clone(&calls),
        }),
        compositor: compositor.clone(),
    };

    Harness {
        calls,
        recognizer,
        compositor,
        services,
    }
}

/// Mid-gray page encoded as PNG
pub fn gray_page_png(width: u32, height: u32) -> Vec<u8> {
    let page = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    crate::utils::image_ops::encode_png(&page).expect("encode test page")
}
