//! Whole-raster overlay export
//!
//! Renders a band at native resolution into a single RGBA image that a map
//! client can stretch over the raster's bounds, as an alternative to a tile
//! pyramid for small rasters.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::Bounds;
use crate::raster::{PixelWindow, RasterError, RasterSource};

use super::color::colorize_band;
use super::normalize::normalize;
use super::profile::NormalizationProfile;

/// Index entry describing an exported overlay image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayInfo {
    /// Image file name relative to the overlay index
    pub file: String,
    /// Leaflet `[[south, west], [north, east]]`
    pub bounds: [[f64; 2]; 2],
    pub layer: String,
    pub profile: NormalizationProfile,
}

impl OverlayInfo {
    pub fn new(layer: &str, profile: NormalizationProfile, wgs84_bounds: &Bounds) -> Self {
        Self {
            file: format!("{}.png", layer),
            bounds: wgs84_bounds.to_leaflet(),
            layer: layer.to_string(),
            profile,
        }
    }
}

/// Render a full band (zero-based) through the normalizer and color mapper
pub fn render_overlay<S: RasterSource + ?Sized>(
    source: &S,
    band: usize,
    profile: NormalizationProfile,
) -> Result<RgbaImage, RasterError> {
    let window = PixelWindow::full(source.width(), source.height());
    debug!("Rendering {} overlay over {}", profile, window);
    let values = source.read_window(band, window)?;
    let normalized = normalize(values.view(), profile);
    Ok(colorize_band(&normalized, profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MAURITIUS, mauritius_source};

    #[test]
    fn test_render_overlay() {
        let source = mauritius_source(40, 20);
        let image = render_overlay(&source, 0, NormalizationProfile::Vegetation).unwrap();
        assert_eq!(image.dimensions(), (40, 20));
        // Ramp starts at -0.2: dark, opaque, no blue
        let first = image.get_pixel(0, 0);
        assert_eq!(first.0, [0, 0, 0, 255]);
        let last = image.get_pixel(39, 19);
        assert!(last[1] >= 254);
        assert_eq!(last[2], 0);
    }

    #[test]
    fn test_overlay_info() {
        let info = OverlayInfo::new("NDVI_2023", NormalizationProfile::Vegetation, &MAURITIUS);
        assert_eq!(info.file, "NDVI_2023.png");
        assert_eq!(info.bounds, [[-20.5, 57.3], [-19.9, 57.8]]);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["profile"], "vegetation");
    }
}
