//! Per-layer `metadata.json` written next to the tiles

use serde::{Deserialize, Serialize};

use crate::geometry::Bounds;
use crate::render::{NormalizationProfile, TileFormat};

use super::types::LayerReport;

/// Description of a finished layer for map clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub layer: String,
    pub profile: NormalizationProfile,
    /// WGS84 extent of the source raster
    pub bounds: Bounds,
    /// Leaflet `[[south, west], [north, east]]`
    pub leaflet_bounds: [[f64; 2]; 2],
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub format: TileFormat,
    /// Relative to the tile store root
    pub url_template: String,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl LayerManifest {
    pub fn new(
        report: &LayerReport,
        bounds: Bounds,
        min_zoom: u8,
        max_zoom: u8,
        tile_size: u32,
        format: TileFormat,
    ) -> Self {
        Self {
            layer: report.layer.clone(),
            profile: report.profile,
            bounds,
            leaflet_bounds: bounds.to_leaflet(),
            min_zoom,
            max_zoom,
            tile_size,
            format,
            url_template: format!("{}/{{z}}/{{x}}/{{y}}.{}", report.layer, format.extension()),
            written: report.written,
            skipped: report.skipped,
            failed: report.failed,
        }
    }

    /// Store key of the manifest for `layer`
    pub fn key(layer: &str) -> String {
        format!("{}/metadata.json", layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_fields() {
        let mut report = LayerReport::new("ndvi", NormalizationProfile::Vegetation);
        report.written = 12;
        let bounds = Bounds::new(57.3, -20.5, 57.8, -19.9);
        let manifest = LayerManifest::new(&report, bounds, 12, 13, 256, TileFormat::Png);
        assert_eq!(manifest.url_template, "ndvi/{z}/{x}/{y}.png");
        assert_eq!(manifest.leaflet_bounds, [[-20.5, 57.3], [-19.9, 57.8]]);
        assert_eq!(LayerManifest::key("ndvi"), "ndvi/metadata.json");

        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: LayerManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
