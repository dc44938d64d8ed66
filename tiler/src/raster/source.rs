//! RasterSource trait definition

use ndarray::Array2;

use crate::geometry::{Bounds, Crs};

use super::types::{GeoTransform, PixelWindow, RasterError};

/// Read-only gridded dataset with an affine georeference
///
/// Implementations must tolerate concurrent `read_window` calls from
/// several worker threads.
pub trait RasterSource: Send + Sync {
    /// Width in pixels
    fn width(&self) -> usize;

    /// Height in pixels
    fn height(&self) -> usize;

    fn band_count(&self) -> usize;

    /// Pixel-to-CRS affine transform
    fn transform(&self) -> GeoTransform;

    fn crs(&self) -> Crs;

    /// Sentinel marking pixels without a measurement, if any
    fn nodata(&self) -> Option<f64>;

    /// Read one band (zero-based) over a window
    ///
    /// The result has shape `(window.height, window.width)`; no-data
    /// samples come back as NaN.
    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError>;

    /// Extent in the source CRS, derived from the transform and dimensions
    fn bounds(&self) -> Bounds {
        self.transform().bounds(self.width(), self.height())
    }

    /// Validate a band index and window against this source
    fn check_request(&self, band: usize, window: &PixelWindow) -> Result<(), RasterError> {
        if band >= self.band_count() {
            return Err(RasterError::BandOutOfRange {
                band,
                count: self.band_count(),
            });
        }
        if !window.fits(self.width(), self.height()) {
            return Err(RasterError::WindowOutOfRange {
                window: *window,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }
}

/// Replace no-data sentinels with NaN in place
pub fn mask_nodata(values: &mut Array2<f32>, nodata: Option<f64>) {
    let Some(nodata) = nodata else {
        return;
    };
    if nodata.is_nan() {
        return;
    }
    let sentinel = nodata as f32;
    values.mapv_inplace(|v| if v == sentinel { f32::NAN } else { v });
}
