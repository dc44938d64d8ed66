//! Channel assignment for normalized values

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use super::profile::NormalizationProfile;

/// Fully transparent pixel used for no-data
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Expand one normalized value into an RGBA pixel
///
/// No-data yields a transparent pixel; valid values are opaque.
#[inline]
pub fn colorize(value: Option<u8>, profile: NormalizationProfile) -> Rgba<u8> {
    let Some(v) = value else {
        return TRANSPARENT;
    };
    let [r, g, b] = match profile {
        NormalizationProfile::Vegetation => [v / 2, v, 0],
        NormalizationProfile::Moisture => [v / 3, 0, v],
        NormalizationProfile::Soil => [v, v / 2, 0],
        NormalizationProfile::Default => [v, v, v],
    };
    Rgba([r, g, b, 255])
}

/// Color a normalized band into an RGBA image of the same shape
pub fn colorize_band(normalized: &Array2<Option<u8>>, profile: NormalizationProfile) -> RgbaImage {
    let (height, width) = normalized.dim();
    RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        colorize(normalized[[y as usize, x as usize]], profile)
    })
}
