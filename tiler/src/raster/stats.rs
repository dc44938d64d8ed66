//! Raster inspection: georeferencing summary and band statistics

use serde::Serialize;

use crate::geometry::{Bounds, Crs};

use super::source::RasterSource;
use super::types::{GeoTransform, PixelWindow, RasterError};

/// Rows read per pass when accumulating statistics
const STRIP_ROWS: usize = 256;

/// NaN-aware statistics of one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStats {
    pub band: usize,
    pub valid_count: u64,
    pub nodata_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

/// Georeferencing and statistics of a raster source
#[derive(Debug, Clone, Serialize)]
pub struct RasterSummary {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub crs: Crs,
    pub transform: GeoTransform,
    /// Extent in the source CRS
    pub bounds: Bounds,
    /// Extent in WGS84, when the CRS is supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wgs84_bounds: Option<Bounds>,
    pub pixel_size: (f64, f64),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    pub stats: BandStats,
}

impl RasterSummary {
    /// Whether the raster's WGS84 extent overlaps `region`
    ///
    /// Rasters that only touch the region along an edge do not count.
    pub fn covers(&self, region: &Bounds) -> bool {
        self.wgs84_bounds
            .map(|b| b.overlaps(region))
            .unwrap_or(false)
    }
}

/// Summarize a source and compute statistics for one band (zero-based)
///
/// The band is read in strips of rows, so the whole raster is never resident.
pub fn inspect<S: RasterSource + ?Sized>(
    source: &S,
    band: usize,
) -> Result<RasterSummary, RasterError> {
    if band >= source.band_count() {
        return Err(RasterError::BandOutOfRange {
            band,
            count: source.band_count(),
        });
    }

    let (width, height) = (source.width(), source.height());
    let mut valid_count = 0u64;
    let mut nodata_count = 0u64;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    let mut row = 0;
    while row < height {
        let rows = STRIP_ROWS.min(height - row);
        let strip = source.read_window(band, PixelWindow::new(0, row, width, rows))?;
        for &v in strip.iter() {
            if v.is_nan() {
                nodata_count += 1;
                continue;
            }
            let v = f64::from(v);
            valid_count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        row += rows;
    }

    let stats = if valid_count > 0 {
        BandStats {
            band,
            valid_count,
            nodata_count,
            min: Some(min),
            max: Some(max),
            mean: Some(sum / valid_count as f64),
        }
    } else {
        BandStats {
            band,
            valid_count,
            nodata_count,
            min: None,
            max: None,
            mean: None,
        }
    };

    let bounds = source.bounds();
    let transform = source.transform();
    Ok(RasterSummary {
        width,
        height,
        band_count: source.band_count(),
        crs: source.crs(),
        transform,
        bounds,
        wgs84_bounds: source.crs().bounds_to_wgs84(&bounds),
        pixel_size: transform.pixel_size(),
        nodata: source.nodata(),
        stats,
    })
}
