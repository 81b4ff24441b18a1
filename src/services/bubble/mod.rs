use crate::core::types::{BubbleContour, CleanedBubble};
use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use tracing::trace;

/// Removes source text from a bubble crop and reports where new text may go
pub trait BubbleProcessor: Send + Sync {
    fn process(&self, crop: &RgbImage) -> Result<CleanedBubble>;
}

/// Gray level above which a pixel counts as bubble background
const WHITE_THRESHOLD: u8 = 240;

/// Whitens the interior of the largest bright contour in the crop
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourBubbleProcessor;

impl ContourBubbleProcessor {
    pub fn new() -> Self {
        Self
    }

    fn binarize(crop: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(crop);
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y)[0] > WHITE_THRESHOLD {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Shoelace area of a closed outline
    fn polygon_area(points: &[Point<i32>]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let twice: i64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
            .sum();
        (twice as f64 / 2.0).abs()
    }

    fn largest_outer_contour(mask: &GrayImage) -> Option<Vec<Point<i32>>> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .map(|c| c.points)
            .max_by(|a, b| {
                Self::polygon_area(a)
                    .partial_cmp(&Self::polygon_area(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Polygon fill needs an open outline with no repeated neighbours
    fn fillable_outline(points: &[Point<i32>]) -> Option<Vec<Point<i32>>> {
        let mut outline: Vec<Point<i32>> = Vec::with_capacity(points.len());
        for &p in points {
            if outline.last() != Some(&p) {
                outline.push(p);
            }
        }
        while outline.len() > 1 && outline.first() == outline.last() {
            outline.pop();
        }
        (outline.len() >= 3).then_some(outline)
    }

    fn bounds_of(points: &[Point<i32>]) -> (u32, u32, u32, u32) {
        let min_x = points.iter().map(|p| p.x).min().unwrap_or(0).max(0);
        let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
        let max_x = points.iter().map(|p| p.x).max().unwrap_or(0).max(min_x);
        let max_y = points.iter().map(|p| p.y).max().unwrap_or(0).max(min_y);
        (
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

impl BubbleProcessor for ContourBubbleProcessor {
    fn process(&self, crop: &RgbImage) -> Result<CleanedBubble> {
        let (width, height) = crop.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot process an empty crop");
        }

        let mask = Self::binarize(crop);
        let mut image = crop.clone();

        let outline = Self::largest_outer_contour(&mask)
            .and_then(|points| Self::fillable_outline(&points));

        let contour = match outline {
            Some(points) => {
                draw_polygon_mut(&mut image, &points, Rgb([255, 255, 255]));
                let bounds = Self::bounds_of(&points);
                trace!("Bubble contour: {} points, bounds {:?}", points.len(), bounds);
                BubbleContour {
                    points: points.iter().map(|p| (p.x, p.y)).collect(),
                    bounds,
                }
            }
            None => {
                trace!("No bubble contour found, using the full {}x{} crop", width, height);
                BubbleContour::full(width, height)
            }
        };

        Ok(CleanedBubble { image, contour })
    }
}
