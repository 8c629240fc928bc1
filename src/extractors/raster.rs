//! Crop preparation for OCR.
//!
//! A block's padded box is cut out of the page raster, converted to
//! grayscale, upscaled ×2 when short, and contrast-stretched between the
//! 2nd and 98th intensity percentiles.

use image::{imageops, GrayImage, RgbImage};
use imageproc::contrast::stretch_contrast_mut;
use imageproc::stats::percentile;

use crate::geometry::BBox;

/// Crops shorter than this are upscaled before OCR.
pub const UPSCALE_BELOW_HEIGHT: u32 = 300;

/// Upscaling factor for short crops.
pub const UPSCALE_FACTOR: u32 = 2;

const LOW_PERCENTILE: u8 = 2;
const HIGH_PERCENTILE: u8 = 98;

/// Integer pixel rectangle `(x, y, width, height)` covering `bbox` inside the image.
pub fn crop_rect(bbox: &BBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clipped = bbox.clip(width as f32, height as f32)?;
    let x = clipped.x1.floor().max(0.0) as u32;
    let y = clipped.y1.floor().max(0.0) as u32;
    let x2 = (clipped.x2.ceil() as u32).min(width);
    let y2 = (clipped.y2.ceil() as u32).min(height);
    (x2 > x && y2 > y).then(|| (x, y, x2 - x, y2 - y))
}

/// RGB crop of `bbox`.
pub fn crop(image: &RgbImage, bbox: &BBox) -> Option<RgbImage> {
    let (x, y, w, h) = crop_rect(bbox, image.width(), image.height())?;
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// OCR-ready grayscale crop of `bbox` padded by `padding` pixels.
pub fn prepare_crop(image: &RgbImage, bbox: &BBox, padding: f32) -> Option<GrayImage> {
    let rgb = crop(image, &bbox.pad(padding))?;
    let mut gray = imageops::grayscale(&rgb);

    if gray.height() < UPSCALE_BELOW_HEIGHT {
        gray = imageops::resize(
            &gray,
            gray.width() * UPSCALE_FACTOR,
            gray.height() * UPSCALE_FACTOR,
            imageops::FilterType::Lanczos3,
        );
    }

    let lo = percentile(&gray, LOW_PERCENTILE);
    let hi = percentile(&gray, HIGH_PERCENTILE);
    // Flat crops have nothing to stretch.
    if lo < hi {
        stretch_contrast_mut(&mut gray, lo, hi, 0, 255);
    }
    Some(gray)
}
