//! Terminal fallback for image classification.
//!
//! This is NOT a classifier. It exists so the classification endpoint
//! always answers when no vision provider is configured; the label only
//! reflects whether the image is dark or bright. Testers should treat any
//! result with `fallback = true` as meaningless.

use image::imageops::FilterType;

use crate::error::RelayError;

pub const SAMPLE_SIZE: u32 = 32;
pub const DARK_LABEL: &str = "cow";
pub const BRIGHT_LABEL: &str = "cat";
pub const HEURISTIC_CONFIDENCE: f64 = 0.65;

/// Mean channel value (0..=255) of the image resized to 32x32.
pub fn average_brightness(image_bytes: &[u8]) -> Result<f64, RelayError> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| RelayError::InvalidImage(e.to_string()))?;
    let small = img
        .resize_exact(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
        .to_rgb8();

    let total: u64 = small.pixels().map(|p| p.0.iter().map(|&c| c as u64).sum::<u64>()).sum();
    let samples = (SAMPLE_SIZE * SAMPLE_SIZE * 3) as f64;
    Ok(total as f64 / samples)
}

/// Two-label brightness threshold.
pub fn brightness_label(avg: f64) -> &'static str {
    if avg < 128.0 { DARK_LABEL } else { BRIGHT_LABEL }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_of(color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn black_is_dark_white_is_bright() {
        let dark = average_brightness(&png_of([0, 0, 0])).unwrap();
        let bright = average_brightness(&png_of([255, 255, 255])).unwrap();
        assert!(dark < 1.0);
        assert!(bright > 254.0);
        assert_eq!(brightness_label(dark), DARK_LABEL);
        assert_eq!(brightness_label(bright), BRIGHT_LABEL);
    }

    #[test]
    fn garbage_bytes_rejected() {
        let err = average_brightness(b"definitely not an image").unwrap_err();
        assert!(matches!(err, RelayError::InvalidImage(_)));
    }
}
