//! Raster Pyramid Library
//!
//! Converts georeferenced rasters into slippy-map tile pyramids
//! (`{layer}/{z}/{x}/{y}.png`). This module exports the tiler components for
//! the command-line binary, integration tests and benchmarks.

pub mod config;
pub mod geometry;
pub mod pyramid;
pub mod raster;
pub mod render;
pub mod tiles;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use geometry::{Bounds, Crs};
pub use pyramid::{
    BuildOptions, CancelToken, FsTileSink, LayerReport, MemoryTileSink, PyramidBuilder, TileSink,
};
pub use raster::{ArrayRasterSource, GeoTiffSource, GeoTransform, RasterSource};
pub use render::{NormalizationProfile, ProfileRules};
pub use tiles::{TileCoordinate, geo_to_tile, tile_to_geo, tiles_intersecting};
