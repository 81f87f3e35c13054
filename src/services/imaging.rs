use anyhow::{Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

/// Bounding box thumbnails are fitted into
pub const THUMB_MAX_WIDTH: u32 = 400;
pub const THUMB_MAX_HEIGHT: u32 = 400;

/// Thumbnails are always re-encoded as JPEG
pub const THUMB_CONTENT_TYPE: &str = "image/jpeg";
pub const THUMB_EXTENSION: &str = "jpg";
const THUMB_QUALITY: u8 = 80;

const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/pjpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/x-ms-bmp",
];

/// Whether the content type is one of the raster formats thumbnails are made for.
pub fn is_image(content_type: &str) -> bool {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    IMAGE_TYPES.contains(&normalized.as_str())
}

/// Pixel dimensions read from the image header, `None` if the format is unknown.
///
/// Only the header is decoded; `data` is borrowed and left untouched.
pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Scale `(width, height)` to fit inside the given bounds.
///
/// Both sides are scaled by the tighter of the two ratios, and never enlarged.
/// A missing bound places no constraint on that side.
pub fn fit_within(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let ratio_w = max_width.map_or(1.0, |m| m as f64 / width as f64);
    let ratio_h = max_height.map_or(1.0, |m| m as f64 / height as f64);
    let ratio = ratio_w.min(ratio_h).min(1.0);

    if ratio >= 1.0 {
        return (width, height);
    }

    let scaled_w = ((width as f64) * ratio).round().max(1.0) as u32;
    let scaled_h = ((height as f64) * ratio).round().max(1.0) as u32;
    (scaled_w, scaled_h)
}

/// Produce a JPEG thumbnail fitted inside `max_width` x `max_height`.
///
/// Works on a borrowed buffer so the original bytes stay available for storage.
pub fn thumbnail(data: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>> {
    let img =
        image::load_from_memory(data).map_err(|e| anyhow!("Failed to load image: {}", e))?;

    let (width, height) = img.dimensions();
    let (target_w, target_h) = fit_within(width, height, Some(max_width), Some(max_height));

    let resized = if (target_w, target_h) == (width, height) {
        img
    } else {
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    encode_jpeg(&resized)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    // JPEG has no alpha channel or high bit depths
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, THUMB_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(|e| anyhow!("Failed to encode JPEG thumbnail: {}", e))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 30, 30]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/PNG"));
        assert!(is_image("image/jpeg; charset=binary"));
        assert!(is_image("IMAGE/WEBP"));
        assert!(is_image("image/bmp"));
        assert!(!is_image("image/svg+xml"));
        assert!(!is_image("video/mp4"));
        assert!(!is_image(""));
    }

    #[test]
    fn test_dimensions() {
        let data = png(120, 45);
        assert_eq!(dimensions(&data), Some((120, 45)));
        assert_eq!(dimensions(b"definitely not an image"), None);
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(4000, 3000, Some(200), Some(200)), (200, 150));
        assert_eq!(fit_within(100, 50, Some(200), Some(200)), (100, 50));
        assert_eq!(fit_within(1000, 500, Some(500), None), (500, 250));
        assert_eq!(fit_within(1000, 500, Some(800), Some(100)), (200, 100));
        assert_eq!(fit_within(1000, 500, None, None), (1000, 500));
    }

    #[test]
    fn test_thumbnail_bounds_and_aspect() {
        let data = png(4000, 3000);
        let thumb = thumbnail(&data, 200, 200).unwrap();

        let decoded = image::load_from_memory(&thumb).unwrap();
        let (w, h) = decoded.dimensions();
        assert!(w <= 200 && h <= 200);
        assert_eq!((w, h), (200, 150));
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_thumbnail_never_upscales() {
        let data = png(100, 50);
        let thumb = thumbnail(&data, 200, 200).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn test_thumbnail_rejects_garbage() {
        assert!(thumbnail(b"nope", 200, 200).is_err());
    }
}
