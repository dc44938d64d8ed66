//! Raster sources and windowed reads
//!
//! This module provides:
//! - The `RasterSource` trait with GeoTIFF and in-memory implementations
//! - `read_window` mapping a WGS84 extent to a clamped pixel window
//! - `inspect` for georeferencing summaries and band statistics

mod geotiff;
mod memory;
mod source;
mod stats;
mod types;
mod window;

pub use geotiff::GeoTiffSource;
pub use memory::ArrayRasterSource;
pub use source::{RasterSource, mask_nodata};
pub use stats::{BandStats, RasterSummary, inspect};
pub use types::{GeoTransform, PixelWindow, RasterError};
pub use window::{WindowData, WindowResult, pixel_window, read_window};
