// Data model shared by the pipeline, the services and the HTTP layer

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A detected bubble rectangle in page pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleRegion {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BubbleRegion {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self { x1, y1, x2, y2, confidence, class_id }
    }

    /// Integer-truncated bounds clamped to a `width` x `height` page.
    ///
    /// Returns `(x, y, w, h)`, or `None` when nothing of the region is left.
    pub fn crop_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32, max: u32| -> u32 { (v.trunc().max(0.0) as u32).min(max) };

        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }

    pub fn as_bbox(&self) -> [i32; 4] {
        [self.x1 as i32, self.y1 as i32, self.x2 as i32, self.y2 as i32]
    }
}

/// Where text may be drawn inside a cleaned bubble crop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleContour {
    /// Outline of the bubble interior, crop-local coordinates
    pub points: Vec<(i32, i32)>,
    /// Bounding rectangle of `points` as (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
}

impl BubbleContour {
    /// Contour covering the whole crop, used when no outline was found
    pub fn full(width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            points: vec![(0, 0), (w - 1, 0), (w - 1, h - 1), (0, h - 1)],
            bounds: (0, 0, width, height),
        }
    }
}

/// BubbleProcessor output: text-free crop plus placement geometry
#[derive(Debug, Clone)]
pub struct CleanedBubble {
    pub image: RgbImage,
    pub contour: BubbleContour,
}

/// Error returned when a key is not in one of the closed enumerations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey(pub String);

/// Renders keys the way the upstream web client expects: `['a', 'b']`
pub fn format_key_list<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = keys.into_iter().map(|k| format!("'{}'", k)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Selects which external translation backend handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMethod {
    Google,
    Hf,
    Baidu,
    Bing,
}

impl TranslationMethod {
    /// Every accepted method, in the order they are advertised
    pub const ALL: [TranslationMethod; 4] = [
        TranslationMethod::Google,
        TranslationMethod::Hf,
        TranslationMethod::Baidu,
        TranslationMethod::Bing,
    ];

    pub const DEFAULT: TranslationMethod = TranslationMethod::Google;

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationMethod::Google => "google",
            TranslationMethod::Hf => "hf",
            TranslationMethod::Baidu => "baidu",
            TranslationMethod::Bing => "bing",
        }
    }

    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.as_str()).collect()
    }

    pub fn invalid_message() -> String {
        format!(
            "Invalid translation method. Must be one of: {}",
            format_key_list(Self::keys())
        )
    }
}

impl FromStr for TranslationMethod {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

impl fmt::Display for TranslationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named font used to draw translated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontSelection {
    #[serde(rename = "animeace_i")]
    AnimeAceI,
    #[serde(rename = "mangati")]
    MangaTi,
    #[serde(rename = "ariali")]
    ArialI,
}

const FONT_COUNT: usize = 3;

impl FontSelection {
    /// Key and font file for every selectable font, in advertised order
    const TABLE: [(FontSelection, &'static str, &'static str); FONT_COUNT] = [
        (FontSelection::AnimeAceI, "animeace_i", "animeace_i.ttf"),
        (FontSelection::MangaTi, "mangati", "mangati.ttf"),
        (FontSelection::ArialI, "ariali", "ariali.ttf"),
    ];

    pub const ALL: [FontSelection; FONT_COUNT] = {
        let mut all = [FontSelection::AnimeAceI; FONT_COUNT];
        let mut i = 0;
        while i < FONT_COUNT {
            all[i] = Self::TABLE[i].0;
            i += 1;
        }
        all
    };

    pub const DEFAULT: FontSelection = FontSelection::AnimeAceI;

    fn entry(&self) -> (FontSelection, &'static str, &'static str) {
        let row = match self {
            FontSelection::AnimeAceI => 0,
            FontSelection::MangaTi => 1,
            FontSelection::ArialI => 2,
        };
        Self::TABLE[row]
    }

    pub fn as_str(&self) -> &'static str {
        self.entry().1
    }

    pub fn file_name(&self) -> &'static str {
        self.entry().2
    }

    pub fn keys() -> Vec<&'static str> {
        Self::TABLE.iter().map(|(_, key, _)| *key).collect()
    }

    pub fn invalid_message() -> String {
        format!("Invalid font. Must be one of: {}", format_key_list(Self::keys()))
    }
}

impl FromStr for FontSelection {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::TABLE
            .into_iter()
            .find(|(_, key, _)| *key == s)
            .map(|(font, _, _)| font)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

impl fmt::Display for FontSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `/api/translate` request
#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub filename: String,
    pub image_bytes: Vec<u8>,
    pub method: TranslationMethod,
    pub font: FontSelection,
}

/// Body of `GET /api/fonts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontsResponse {
    pub fonts: Vec<String>,
}

/// Body of `GET /api/translation-methods`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationMethodsResponse {
    pub translation_methods: Vec<String>,
}

/// Per-request summary logged after a successful run
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub bubbles_detected: usize,
    pub bubbles_rendered: usize,
    pub bubbles_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_table_round_trip() {
        for method in TranslationMethod::ALL {
            assert_eq!(method.as_str().parse::<TranslationMethod>(), Ok(method));
        }
        assert!("deepl".parse::<TranslationMethod>().is_err());
        assert!("Google".parse::<TranslationMethod>().is_err());
    }

    #[test]
    fn test_font_table_round_trip() {
        for font in FontSelection::ALL {
            assert_eq!(font.as_str().parse::<FontSelection>(), Ok(font));
        }
        assert_eq!(FontSelection::MangaTi.file_name(), "mangati.ttf");
        assert_eq!(FontSelection::keys().len(), FontSelection::ALL.len());
    }

    #[test]
    fn test_font_rows_match_their_variants() {
        assert_eq!(
            FontSelection::ALL,
            [FontSelection::AnimeAceI, FontSelection::MangaTi, FontSelection::ArialI]
        );
        for (row, (font, key, file)) in FontSelection::TABLE.iter().enumerate() {
            assert_eq!(FontSelection::ALL[row], *font);
            assert_eq!(font.entry(), (*font, *key, *file));
            assert_eq!(*file, format!("{}.ttf", key));
        }
    }

    #[test]
    fn test_invalid_messages() {
        assert_eq!(
            TranslationMethod::invalid_message(),
            "Invalid translation method. Must be one of: ['google', 'hf', 'baidu', 'bing']"
        );
        assert_eq!(
            FontSelection::invalid_message(),
            "Invalid font. Must be one of: ['animeace_i', 'mangati', 'ariali']"
        );
    }

    #[test]
    fn test_crop_bounds_truncates_and_clamps() {
        let region = BubbleRegion::new(10.9, 5.2, 40.7, 30.99, 0.9, 0);
        assert_eq!(region.crop_bounds(100, 100), Some((10, 5, 30, 25)));

        let overflowing = BubbleRegion::new(-4.0, 90.0, 120.0, 130.0, 0.5, 0);
        assert_eq!(overflowing.crop_bounds(100, 100), Some((0, 90, 100, 10)));

        let inverted = BubbleRegion::new(50.0, 50.0, 20.0, 80.0, 0.5, 0);
        assert_eq!(inverted.crop_bounds(100, 100), None);
    }
}
