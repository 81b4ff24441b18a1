use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Asynchronously decode uploaded bytes into an RGB page using spawn_blocking.
///
/// Image decoding is CPU-intensive, especially for large scans.
pub async fn decode_page_async(bytes: Vec<u8>) -> Result<RgbImage> {
    tokio::task::spawn_blocking(move || decode_page(&bytes))
        .await
        .context("Failed to spawn blocking task for image decoding")?
}

/// Decode raw upload bytes; the format is sniffed from the content
pub fn decode_page(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        anyhow::bail!("Uploaded image is empty");
    }
    let img = image::load_from_memory(bytes).context("Failed to load image from memory")?;
    Ok(img.to_rgb8())
}

/// Asynchronously encode an image to PNG bytes using spawn_blocking.
pub async fn encode_png_async(img: RgbImage) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_png(&img))
        .await
        .context("Failed to spawn blocking task for PNG encoding")?
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    let mut cursor = Cursor::new(&mut png_bytes);
    img.write_to(&mut cursor, ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_bytes)
}

/// Copy a `(x, y, w, h)` rectangle out of the page
pub fn crop(page: &RgbImage, bounds: (u32, u32, u32, u32)) -> RgbImage {
    let (x, y, w, h) = bounds;
    image::imageops::crop_imm(page, x, y, w, h).to_image()
}

/// Write `bubble` over the page at `(x, y)`; anything past the page edge is clipped
pub fn paste(page: &mut RgbImage, bubble: &RgbImage, x: u32, y: u32) {
    image::imageops::replace(page, bubble, x as i64, y as i64);
}

pub fn to_dynamic(img: RgbImage) -> DynamicImage {
    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbaImage, Rgba};

    #[test]
    fn test_decode_converts_to_rgb() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([255, 0, 0, 255])));
        let mut png_bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .unwrap();

        let page = decode_page(&png_bytes).unwrap();
        assert_eq!(page.dimensions(), (4, 3));
        assert_eq!(page.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_page(&[]).is_err());
        assert!(decode_page(b"definitely not an image").is_err());
    }

    #[test]
    fn test_crop_and_paste() {
        let mut page = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        page.put_pixel(5, 6, Rgb([9, 9, 9]));

        let cropped = crop(&page, (5, 6, 4, 4));
        assert_eq!(cropped.dimensions(), (4, 4));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([9, 9, 9]));

        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        paste(&mut page, &white, 18, 18);
        assert_eq!(page.get_pixel(19, 19), &Rgb([255, 255, 255]));
        assert_eq!(page.get_pixel(17, 17), &Rgb([0, 0, 0]));
    }

    #[tokio::test]
    async fn test_encode_png_async_round_trips_dimensions() {
        let page = RgbImage::from_pixel(7, 5, Rgb([1, 2, 3]));
        let png = encode_png_async(page).await.unwrap();
        let decoded = decode_page_async(png).await.unwrap();
        assert_eq!(decoded.dimensions(), (7, 5));
    }
}
