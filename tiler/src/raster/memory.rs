//! In-memory raster source backed by an ndarray cube

use ndarray::{Array2, Array3, s};

use crate::geometry::Crs;

use super::source::{RasterSource, mask_nodata};
use super::types::{GeoTransform, PixelWindow, RasterError};

/// Raster held entirely in memory, laid out as (band, row, col)
#[derive(Debug, Clone)]
pub struct ArrayRasterSource {
    data: Array3<f32>,
    transform: GeoTransform,
    crs: Crs,
    nodata: Option<f64>,
}

impl ArrayRasterSource {
    pub fn new(data: Array3<f32>, transform: GeoTransform, crs: Crs) -> Self {
        Self {
            data,
            transform,
            crs,
            nodata: None,
        }
    }

    /// Single-band raster
    pub fn from_band(band: Array2<f32>, transform: GeoTransform, crs: Crs) -> Self {
        let data = band.insert_axis(ndarray::Axis(0));
        Self::new(data, transform, crs)
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }
}

impl RasterSource for ArrayRasterSource {
    fn width(&self) -> usize {
        self.data.dim().2
    }

    fn height(&self) -> usize {
        self.data.dim().1
    }

    fn band_count(&self) -> usize {
        self.data.dim().0
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError> {
        self.check_request(band, &window)?;
        let mut values = self
            .data
            .slice(s![
                band,
                window.row_off..window.row_end(),
                window.col_off..window.col_end()
            ])
            .to_owned();
        mask_nodata(&mut values, self.nodata);
        Ok(values)
    }
}
