use crate::core::config::Config;
use crate::core::types::BubbleRegion;
use crate::services::onnx_builder::OnnxSessionPool;
use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::value::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Locates speech bubbles on a page
pub trait BubbleDetector: Send + Sync {
    /// Regions in page pixel coordinates, in the order they should be processed
    fn detect(&self, page: &DynamicImage) -> Result<Vec<BubbleRegion>>;
}

pub struct DetectionService {
    session_pool: OnnxSessionPool,
    config: Arc<Config>,
}

impl DetectionService {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let session_pool = OnnxSessionPool::load(
            &config.models.detector_model_path,
            "Detection",
            config.onnx_pool_size(),
        )?;

        Ok(Self {
            session_pool,
            config,
        })
    }

    pub fn device_type(&self) -> &str {
        self.session_pool.device_type()
    }

    /// Letterbox-free resize to a square input, RGB scaled to [0, 1]
    fn preprocess_image(&self, img: &DynamicImage) -> Array4<f32> {
        let target_size = self.config.target_size();
        trace!(
            "Preprocessing image: {}x{} -> {}x{}",
            img.width(),
            img.height(),
            target_size,
            target_size
        );

        let resized = img.resize_exact(
            target_size,
            target_size,
            image::imageops::FilterType::Triangle,
        );
        let rgb_img = resized.to_rgb8();

        let target = target_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, target, target));

        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        array
    }

    /// Decode a `[1, 4 + classes, anchors]` output into page-space regions
    fn decode_output(
        shape: &[i64],
        data: &[f32],
        scale_x: f32,
        scale_y: f32,
        confidence_threshold: f32,
    ) -> Result<Vec<BubbleRegion>> {
        if shape.len() != 3 || shape[1] < 5 {
            anyhow::bail!("Unexpected detector output shape {:?}", shape);
        }
        let channels = shape[1] as usize;
        let anchors = shape[2] as usize;
        if data.len() < channels * anchors {
            anyhow::bail!(
                "Detector output has {} values, expected {}",
                data.len(),
                channels * anchors
            );
        }

        let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];
        let mut regions = Vec::new();

        for i in 0..anchors {
            let (class_id, score) = (4..channels)
                .map(|c| (c - 4, at(c, i)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            regions.push(BubbleRegion::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
                score,
                class_id as u32,
            ));
        }

        Ok(regions)
    }

    fn calculate_iou(box1: &[i32; 4], box2: &[i32; 4]) -> f32 {
        let x1 = box1[0].max(box2[0]);
        let y1 = box1[1].max(box2[1]);
        let x2 = box1[2].min(box2[2]);
        let y2 = box1[3].min(box2[3]);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = ((x2 - x1) * (y2 - y1)) as f32;
        let area1 = ((box1[2] - box1[0]) * (box1[3] - box1[1])) as f32;
        let area2 = ((box2[2] - box2[0]) * (box2[3] - box2[1])) as f32;
        let union = area1 + area2 - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Class-agnostic non-maximum suppression; output is sorted by descending confidence
    fn nms(detections: Vec<BubbleRegion>, iou_threshold: f32) -> Vec<BubbleRegion> {
        if detections.is_empty() {
            return vec![];
        }

        let mut sorted = detections;
        sorted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut keep = Vec::new();
        let mut suppressed = vec![false; sorted.len()];

        for i in 0..sorted.len() {
            if suppressed[i] {
                continue;
            }
            keep.push(sorted[i]);

            let bbox_i = sorted[i].as_bbox();
            for j in (i + 1)..sorted.len() {
                if !suppressed[j] && Self::calculate_iou(&bbox_i, &sorted[j].as_bbox()) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }

        debug!("NMS: kept {}/{} detections", keep.len(), sorted.len());
        keep
    }
}

impl BubbleDetector for DetectionService {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<BubbleRegion>> {
        let detection_start = std::time::Instant::now();
        let input = self.preprocess_image(page);
        let images_value = Value::from_array(input)?;

        // Copy outputs out before the session goes back to the pool
        let (shape, data) = {
            let mut session = self.session_pool.acquire()?;
            let outputs = session
                .run(ort::inputs!["images" => images_value])
                .context("Detector inference failed")?;
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            (shape.to_vec(), data.to_vec())
        };

        let target = self.config.target_size() as f32;
        let candidates = Self::decode_output(
            &shape,
            &data,
            page.width() as f32 / target,
            page.height() as f32 / target,
            self.config.confidence_threshold(),
        )?;
        trace!("{} candidates above confidence threshold", candidates.len());

        let regions = Self::nms(candidates, self.config.iou_threshold());

        debug!(
            "✓ Detected {} bubbles in {:.2}ms",
            regions.len(),
            detection_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(regions)
    }
}
