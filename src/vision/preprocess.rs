//! Down-scaling applied to templates and frames before matching
//!
//! Matching at a reduced resolution trades a little precision for a large cut
//! in correlation work; the engine compensates with a lower match threshold.

use image::imageops::FilterType;
use image::RgbImage;

/// Scale factors this close to 1.0 are treated as full resolution
const UNIT_SCALE_EPSILON: f32 = 0.01;

/// Whether `scale` leaves images at their original size
pub fn is_unit_scale(scale: f32) -> bool {
    (scale - 1.0).abs() < UNIT_SCALE_EPSILON
}

/// Resize `image` by `scale`, never below 1x1
pub fn downscale(image: &RgbImage, scale: f32) -> RgbImage {
    if is_unit_scale(scale) {
        return image.clone();
    }

    let new_w = ((image.width() as f32 * scale) as u32).max(1);
    let new_h = ((image.height() as f32 * scale) as u32).max(1);
    image::imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

/// Map a location found in a scaled frame back to full-resolution coordinates
pub fn upscale_location(location: (u32, u32), scale: f32) -> (u32, u32) {
    if is_unit_scale(scale) {
        return location;
    }

    (
        (location.0 as f32 / scale).round() as u32,
        (location.1 as f32 / scale).round() as u32,
    )
}
