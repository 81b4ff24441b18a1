// Text recognition for cropped bubbles
// CTC line recognizer running on ONNX Runtime

use crate::services::onnx_builder::OnnxSessionPool;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::value::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Reads the source-language text inside a bubble crop
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> Result<String>;
}

/// OCR model input dimensions
const TARGET_HEIGHT: u32 = 60;
const MIN_WIDTH: u32 = 10;

const MODEL_FILE: &str = "ocr.onnx";
const VOCAB_FILE: &str = "vocab.txt";

/// Index to character table plus the CTC blank index
#[derive(Debug, Clone)]
struct Vocabulary {
    chars: HashMap<usize, String>,
    blank_index: usize,
}

impl Vocabulary {
    /// Parse `index\tchar` lines; `<space>` is a space, `<blank>` marks the CTC blank
    fn parse(content: &str) -> Result<Self> {
        let mut chars = HashMap::new();
        let mut blank_index = None;

        for line in content.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let Some((idx_str, char_str)) = line.split_once('\t') else {
                continue;
            };
            let Ok(idx) = idx_str.trim().parse::<usize>() else {
                continue;
            };

            match char_str {
                "<blank>" => blank_index = Some(idx),
                "<space>" => {
                    chars.insert(idx, " ".to_string());
                }
                other => {
                    chars.insert(idx, other.to_string());
                }
            }
        }

        if chars.is_empty() {
            anyhow::bail!("OCR vocabulary is empty");
        }

        // Without an explicit entry the blank follows the last character
        let blank_index = blank_index
            .unwrap_or_else(|| chars.keys().max().copied().unwrap_or(0) + 1);

        Ok(Self { chars, blank_index })
    }

    /// Greedy CTC decode: best class per step, collapse repeats, drop blanks
    fn ctc_decode(&self, logits: &[f32], seq_len: usize, vocab_size: usize) -> String {
        let mut text = String::new();
        let mut prev_idx: Option<usize> = None;

        for t in 0..seq_len {
            let offset = t * vocab_size;
            let Some(step) = logits.get(offset..offset + vocab_size) else {
                break;
            };

            let best_idx = step
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0;

            if best_idx != self.blank_index && Some(best_idx) != prev_idx {
                if let Some(ch) = self.chars.get(&best_idx) {
                    text.push_str(ch);
                }
            }
            prev_idx = Some(best_idx);
        }

        text
    }
}

pub struct OcrService {
    session_pool: OnnxSessionPool,
    vocab: Vocabulary,
}

impl OcrService {
    /// Load `ocr.onnx` and `vocab.txt` from `model_dir`
    pub fn new(model_dir: &Path, pool_size: usize) -> Result<Self> {
        let vocab_path = model_dir.join(VOCAB_FILE);
        if !vocab_path.exists() {
            anyhow::bail!("OCR vocabulary not found at: {}", vocab_path.display());
        }

        let content = std::fs::read_to_string(&vocab_path)
            .with_context(|| format!("Failed to read vocabulary file {}", vocab_path.display()))?;
        let vocab = Vocabulary::parse(&content)?;

        let session_pool = OnnxSessionPool::load(&model_dir.join(MODEL_FILE), "OCR", pool_size)?;

        info!(
            "OCR service initialized: vocab_size={}, blank_index={}",
            vocab.chars.len(),
            vocab.blank_index
        );

        Ok(Self {
            session_pool,
            vocab,
        })
    }

    /// Resize to the model height keeping aspect ratio; returns `[1, 3, H, W]` and the CTC step count
    fn preprocess_image(image: &DynamicImage) -> (Array4<f32>, i32) {
        let (w, h) = image.dimensions();

        let scale = TARGET_HEIGHT as f32 / h.max(1) as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let rgb = image
            .resize_exact(new_w, TARGET_HEIGHT, image::imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        // LSTM stride of 4
        let seq_length = (new_w / 4) as i32;
        (tensor, seq_length)
    }
}

impl TextRecognizer for OcrService {
    fn recognize(&self, crop: &DynamicImage) -> Result<String> {
        let (tensor, seq_length) = Self::preprocess_image(crop);

        let data_value = Value::from_array(tensor)?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length]))?;

        let (dims, logits) = {
            let mut session = self.session_pool.acquire()?;
            let outputs = session
                .run(ort::inputs![
                    "data" => data_value,
                    "seq_lengths" => seq_lengths_value
                ])
                .context("OCR inference failed")?;

            let (shape, logits_data) = outputs[0].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits_data.to_vec())
        };

        let (seq_len, vocab_size) = match dims.as_slice() {
            [s, 1, v] => (*s, *v),
            [1, s, v] => (*s, *v),
            [s, v] => (*s, *v),
            _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
        };

        let text = self.vocab.ctc_decode(&logits, seq_len, vocab_size);
        debug!("OCR result: '{}'", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::parse("0\t<blank>\n1\tこ\n2\tん\n3\t<space>\n4\tA\n").unwrap()
    }

    #[test]
    fn test_vocab_parsing() {
        let vocab = vocab();
        assert_eq!(vocab.blank_index, 0);
        assert_eq!(vocab.chars[&3], " ");
        assert_eq!(vocab.chars[&1], "こ");
        assert!(Vocabulary::parse("\n\n").is_err());
    }

    #[test]
    fn test_blank_defaults_past_last_char() {
        let vocab = Vocabulary::parse("0\ta\n1\tb\n").unwrap();
        assert_eq!(vocab.blank_index, 2);
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        let vocab = vocab();
        // steps: こ こ blank ん ん blank ん A
        let best = [1usize, 1, 0, 2, 2, 0, 2, 4];
        let vocab_size = 5;
        let mut logits = vec![0.0f32; best.len() * vocab_size];
        for (t, &idx) in best.iter().enumerate() {
            logits[t * vocab_size + idx] = 1.0;
        }
        assert_eq!(vocab.ctc_decode(&logits, best.len(), vocab_size), "こんんA");
    }

    #[test]
    fn test_preprocess_keeps_aspect_ratio() {
        let img = DynamicImage::new_rgb8(120, 30);
        let (tensor, seq_len) = OcrService::preprocess_image(&img);
        assert_eq!(tensor.shape(), &[1, 3, 60, 240]);
        assert_eq!(seq_len, 60);
    }
}
