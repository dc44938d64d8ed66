//! Slippy-map tile addressing
//!
//! This module provides:
//! - `geo_to_tile` / `tile_to_geo` conversions between WGS84 and (z, x, y)
//! - `TileCoordinate::bounds` for a tile's geographic extent
//! - `tiles_intersecting` for the lazily pruned tile set covering an extent

mod coords;
mod range;

pub use coords::{
    MAX_ZOOM, TileCoordinate, fractional_tile, geo_to_tile, tile_to_geo, tiles_per_axis,
};
pub use range::{TileIter, TileRange, tiles_intersecting};
