//! Raster-related types and error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::geometry::Bounds;

/// Errors that can occur when opening or reading a raster source
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to open raster: {0}")]
    OpenError(String),

    #[error("Missing georeferencing: {0}")]
    MissingGeoreference(String),

    #[error("Unsupported raster layout: {0}")]
    Unsupported(String),

    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("Window {window} outside raster of {width}x{height} pixels")]
    WindowOutOfRange {
        window: PixelWindow,
        width: usize,
        height: usize,
    },

    #[error("Failed to read window: {0}")]
    ReadError(String),

    #[error("TIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Six-coefficient affine transform, GDAL ordering
///
/// `[origin_x, pixel_width, row_rotation, origin_y, column_rotation, pixel_height]`,
/// so `x = c0 + col * c1 + row * c2` and `y = c3 + col * c4 + row * c5`.
/// North-up rasters have zero rotation terms and a negative pixel height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// North-up transform from the top-left corner and pixel size
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs()])
    }

    /// GeoTIFF `ModelTiepoint` + `ModelPixelScale` pair
    ///
    /// The tiepoint maps raster point (i, j) to model point (x, y).
    pub fn from_tiepoint_scale(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (sx, sy) = (scale[0], scale[1]);
        Some(Self([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
    }

    /// GeoTIFF `ModelTransformation` 4x4 row-major matrix
    pub fn from_model_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 16 {
            return None;
        }
        Some(Self([
            matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5],
        ]))
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Pixel (col, row) to CRS coordinates; fractional positions allowed
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    fn determinant(&self) -> f64 {
        self.0[1] * self.0[5] - self.0[2] * self.0[4]
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > f64::EPSILON * 1e-6
    }

    /// CRS coordinates to fractional pixel (col, row)
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !self.is_invertible() {
            return None;
        }
        let c = &self.0;
        let det = self.determinant();
        let dx = x - c[0];
        let dy = y - c[3];
        Some(((c[5] * dx - c[2] * dy) / det, (c[1] * dy - c[4] * dx) / det))
    }

    /// Extent covered by a `width` x `height` grid
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        // Four points are always present
        Bounds::from_points(&corners).unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Extent covered by a pixel window
    pub fn window_bounds(&self, window: &PixelWindow) -> Bounds {
        let (c0, r0) = (window.col_off as f64, window.row_off as f64);
        let (c1, r1) = (
            (window.col_off + window.width) as f64,
            (window.row_off + window.height) as f64,
        );
        let corners = [
            self.apply(c0, r0),
            self.apply(c1, r0),
            self.apply(c0, r1),
            self.apply(c1, r1),
        ];
        Bounds::from_points(&corners).unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Absolute pixel size along x and y
    pub fn pixel_size(&self) -> (f64, f64) {
        let c = &self.0;
        (c[1].hypot(c[4]), c[2].hypot(c[5]))
    }
}

/// Rectangular region of a raster in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// The whole raster
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn col_end(&self) -> usize {
        self.col_off + self.width
    }

    pub fn row_end(&self) -> usize {
        self.row_off + self.height
    }

    /// Whether the window lies within a `width` x `height` raster
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.col_end() <= width && self.row_end() <= height
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}]",
            self.col_off,
            self.col_end(),
            self.row_off,
            self.row_end()
        )
    }
}
