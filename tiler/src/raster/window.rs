//! Geographic window reads
//!
//! A tile's WGS84 bounds are mapped corner by corner into the source CRS,
//! through the inverse affine transform into fractional pixel space, clamped
//! to the raster extent and snapped outward to whole pixels. Only that
//! sub-region is read from the source.

use ndarray::Array2;

use crate::geometry::Bounds;

use super::source::RasterSource;
use super::types::{PixelWindow, RasterError};

/// Slack when snapping fractional pixel edges to whole pixels
const SNAP_EPSILON: f64 = 1e-6;

/// Samples read for one tile
#[derive(Debug, Clone)]
pub struct WindowData {
    /// Band values, shape `(window.height, window.width)`; NaN marks no-data
    pub values: Array2<f32>,
    /// Pixel window the values came from
    pub window: PixelWindow,
    /// WGS84 extent of the window
    pub extent: Bounds,
}

/// Outcome of a window read
#[derive(Debug, Clone)]
pub enum WindowResult {
    /// No overlap with the raster, or only no-data samples
    Empty,
    Data(WindowData),
}

impl WindowResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, WindowResult::Empty)
    }
}

/// Pixel window covering a WGS84 extent, clamped to the raster
///
/// Returns `None` when the clamped window has zero area or the extent cannot
/// be expressed in the source CRS.
pub fn pixel_window<S: RasterSource + ?Sized>(source: &S, bounds: &Bounds) -> Option<PixelWindow> {
    let native = source.crs().bounds_from_wgs84(bounds)?;
    let transform = source.transform();

    let mut pixels = Vec::with_capacity(4);
    for (x, y) in native.corners() {
        pixels.push(transform.inverse(x, y)?);
    }
    let frac = Bounds::from_points(&pixels)?;
    if !frac.west.is_finite() || !frac.north.is_finite() {
        return None;
    }

    let (width, height) = (source.width() as f64, source.height() as f64);
    let col_min = frac.west.clamp(0.0, width);
    let col_max = frac.east.clamp(0.0, width);
    // Bounds::from_points keeps y in south/north, here rows
    let row_min = frac.south.clamp(0.0, height);
    let row_max = frac.north.clamp(0.0, height);

    let col_start = (col_min + SNAP_EPSILON).floor();
    let col_end = (col_max - SNAP_EPSILON).ceil();
    let row_start = (row_min + SNAP_EPSILON).floor();
    let row_end = (row_max - SNAP_EPSILON).ceil();
    if col_end <= col_start || row_end <= row_start {
        return None;
    }

    Some(PixelWindow::new(
        col_start as usize,
        row_start as usize,
        (col_end - col_start) as usize,
        (row_end - row_start) as usize,
    ))
}

/// Read one band over a WGS84 extent
///
/// Only the overlapping sub-window is read. A window with zero area or
/// without a single valid sample is [`WindowResult::Empty`].
pub fn read_window<S: RasterSource + ?Sized>(
    source: &S,
    bounds: &Bounds,
    band: usize,
) -> Result<WindowResult, RasterError> {
    let Some(window) = pixel_window(source, bounds) else {
        return Ok(WindowResult::Empty);
    };

    let values = source.read_window(band, window)?;
    if values.iter().all(|v| v.is_nan()) {
        return Ok(WindowResult::Empty);
    }

    let native = source.transform().window_bounds(&window);
    let extent = source
        .crs()
        .bounds_to_wgs84(&native)
        .ok_or_else(|| RasterError::ReadError(format!("cannot map {} to WGS84", source.crs())))?;

    Ok(WindowResult::Data(WindowData {
        values,
        window,
        extent,
    }))
}
