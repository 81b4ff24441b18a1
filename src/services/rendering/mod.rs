use anyhow::{Context, Result};
use cosmic_text::{
    fontdb, Align, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping,
    SwashCache, Wrap,
};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::types::CleanedBubble;

/// Draws translated text into a cleaned bubble
pub trait TextCompositor: Send + Sync {
    /// Returns a new image the size of `bubble.image`
    fn compose(&self, bubble: &CleanedBubble, text: &str, font: &Path) -> Result<RgbImage>;
}

const MIN_FONT_SIZE: u32 = 8;
const MAX_FONT_SIZE: u32 = 48;
const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Fraction of the contour bounds left empty on each side
const INSET_RATIO: f32 = 0.10;

/// Font system holding exactly one font file
struct LoadedFont {
    font_system: FontSystem,
    swash_cache: SwashCache,
    family: String,
}

impl LoadedFont {
    fn load(path: &Path) -> Result<Self> {
        let font_data = std::fs::read(path)
            .with_context(|| format!("Failed to read font file {}", path.display()))?;

        // Empty database: no system font scan
        let mut db = fontdb::Database::new();
        db.load_font_data(font_data);

        let family = db
            .faces()
            .next()
            .and_then(|face| face.families.first())
            .map(|(name, _)| name.clone())
            .with_context(|| format!("No usable font face in {}", path.display()))?;

        info!("✓ Font: {} from {}", family, path.display());

        Ok(Self {
            font_system: FontSystem::new_with_locale_and_db("en-US".to_string(), db),
            swash_cache: SwashCache::new(),
            family,
        })
    }

    /// Shape `text` wrapped to `max_width`, every line centered
    fn layout(&mut self, text: &str, font_size: f32, max_width: f32) -> Buffer {
        let metrics = Metrics::new(font_size, font_size * LINE_HEIGHT_RATIO);
        let mut buffer = Buffer::new(&mut self.font_system, metrics);

        buffer.set_size(&mut self.font_system, Some(max_width), None);
        buffer.set_wrap(&mut self.font_system, Wrap::WordOrGlyph);

        let attrs = Attrs::new().family(Family::Name(&self.family));
        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced);
        for line in buffer.lines.iter_mut() {
            line.set_align(Some(Align::Center));
        }

        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }

    /// (widest line, total height) of a shaped buffer
    fn measure(buffer: &Buffer) -> (f32, f32) {
        let mut width = 0.0f32;
        let mut lines = 0usize;
        for run in buffer.layout_runs() {
            width = width.max(run.line_w);
            lines += 1;
        }
        (width, lines as f32 * buffer.metrics().line_height)
    }

    /// Largest integer size in [MIN_FONT_SIZE, MAX_FONT_SIZE] whose layout fits the box
    fn fit_font_size(&mut self, text: &str, max_width: f32, max_height: f32) -> u32 {
        let mut low = MIN_FONT_SIZE;
        let mut high = MAX_FONT_SIZE;
        let mut best = None;

        while low <= high {
            let mid = (low + high) / 2;
            let buffer = self.layout(text, mid as f32, max_width);
            let (width, height) = Self::measure(&buffer);

            if width <= max_width && height <= max_height {
                best = Some(mid);
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }

        best.unwrap_or_else(|| {
            warn!(
                "Text overflows {:.0}x{:.0} box even at {}px and will be clipped",
                max_width, max_height, MIN_FONT_SIZE
            );
            MIN_FONT_SIZE
        })
    }
}

/// `(x, y, w, h)` text area: contour bounds shrunk by INSET_RATIO per side, never empty
fn text_box(bounds: (u32, u32, u32, u32)) -> (i32, i32, f32, f32) {
    let (x, y, w, h) = bounds;
    let inset_x = w as f32 * INSET_RATIO;
    let inset_y = h as f32 * INSET_RATIO;
    (
        x as i32 + inset_x as i32,
        y as i32 + inset_y as i32,
        (w as f32 - 2.0 * inset_x).max(1.0),
        (h as f32 - 2.0 * inset_y).max(1.0),
    )
}

fn blend(existing: &Rgb<u8>, color: CosmicColor) -> Rgb<u8> {
    let alpha = color.a() as f32 / 255.0;
    let inv_alpha = 1.0 - alpha;
    Rgb([
        (color.r() as f32 * alpha + existing[0] as f32 * inv_alpha) as u8,
        (color.g() as f32 * alpha + existing[1] as f32 * inv_alpha) as u8,
        (color.b() as f32 * alpha + existing[2] as f32 * inv_alpha) as u8,
    ])
}

/// Compositor built on cosmic-text shaping; one font system per font file, loaded on first use
#[derive(Default)]
pub struct CosmicTextCompositor {
    fonts: Mutex<HashMap<PathBuf, Arc<Mutex<LoadedFont>>>>,
}

impl CosmicTextCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    fn font(&self, path: &Path) -> Result<Arc<Mutex<LoadedFont>>> {
        let mut fonts = self.fonts.lock();
        if let Some(font) = fonts.get(path) {
            return Ok(Arc::clone(font));
        }
        let font = Arc::new(Mutex::new(LoadedFont::load(path)?));
        fonts.insert(path.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }

    /// Load fonts ahead of the first request; missing files are only logged
    pub fn preload<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) {
        for path in paths {
            if let Err(e) = self.font(path) {
                warn!("⚠ Font not loaded: {:#}", e);
            }
        }
    }
}

impl TextCompositor for CosmicTextCompositor {
    fn compose(&self, bubble: &CleanedBubble, text: &str, font: &Path) -> Result<RgbImage> {
        let mut img = bubble.image.clone();
        let text = text.trim();
        if text.is_empty() {
            return Ok(img);
        }

        let loaded = self.font(font)?;
        let mut loaded = loaded.lock();

        let (box_x, box_y, max_width, max_height) = text_box(bubble.contour.bounds);
        let font_size = loaded.fit_font_size(text, max_width, max_height);
        let buffer = loaded.layout(text, font_size as f32, max_width);
        let (_, text_height) = LoadedFont::measure(&buffer);
        let offset_y = box_y + ((max_height - text_height) / 2.0).max(0.0) as i32;

        debug!(
            "Compositing {} chars at {}px into {:.0}x{:.0} box",
            text.chars().count(),
            font_size,
            max_width,
            max_height
        );

        let (img_w, img_h) = (img.width() as i32, img.height() as i32);
        let LoadedFont {
            font_system,
            swash_cache,
            ..
        } = &mut *loaded;

        buffer.draw(font_system, swash_cache, CosmicColor::rgb(0, 0, 0), |px_x, px_y, w, h, color| {
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let x = box_x + px_x + dx;
                    let y = offset_y + px_y + dy;
                    if x >= 0 && x < img_w && y >= 0 && y < img_h {
                        let pixel = img.get_pixel_mut(x as u32, y as u32);
                        *pixel = blend(pixel, color);
                    }
                }
            }
        });

        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BubbleContour;

    fn bubble() -> CleanedBubble {
        CleanedBubble {
            image: RgbImage::from_pixel(50, 40, Rgb([255, 255, 255])),
            contour: BubbleContour::full(50, 40),
        }
    }

    #[test]
    fn test_text_box_inset() {
        assert_eq!(text_box((0, 0, 100, 50)), (10, 5, 80.0, 40.0));
        assert_eq!(text_box((20, 10, 0, 0)), (20, 10, 1.0, 1.0));
    }

    #[test]
    fn test_blend() {
        let white = Rgb([255, 255, 255]);
        assert_eq!(blend(&white, CosmicColor::rgba(0, 0, 0, 255)), Rgb([0, 0, 0]));
        assert_eq!(blend(&white, CosmicColor::rgba(0, 0, 0, 0)), white);
    }

    #[test]
    fn test_empty_text_returns_bubble_unchanged() {
        let compositor = CosmicTextCompositor::new();
        let out = compositor
            .compose(&bubble(), "   ", Path::new("fonts/does-not-matter.ttf"))
            .unwrap();
        assert_eq!(out, bubble().image);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let compositor = CosmicTextCompositor::new();
        let err = compositor
            .compose(&bubble(), "Hello", Path::new("fonts/missing-font.ttf"))
            .unwrap_err();
        assert!(err.to_string().contains("missing-font.ttf"));
    }
}
