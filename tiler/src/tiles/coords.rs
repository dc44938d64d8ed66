//! Slippy-map tile coordinates and their geographic bounds

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::geometry::Bounds;
use crate::geometry::projection::MAX_LATITUDE;

/// Deepest zoom level the tiler accepts
pub const MAX_ZOOM: u8 = 24;

/// A (zoom, column, row) address, origin at the north-west corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Whether column and row fall within `[0, 2^zoom)`
    pub fn is_valid(&self) -> bool {
        self.zoom <= MAX_ZOOM && {
            let n = tiles_per_axis(self.zoom);
            u64::from(self.x) < n && u64::from(self.y) < n
        }
    }

    /// Geographic (WGS84) bounds of this tile
    pub fn bounds(&self) -> Bounds {
        let (north, west) = tile_to_geo(self.x, self.y, self.zoom);
        let (south, east) = tile_to_geo(self.x + 1, self.y + 1, self.zoom);
        Bounds::new(west, south, east, north)
    }

    /// Pixel offset of a geographic point inside this tile
    ///
    /// The result is unclamped, so points outside the tile yield offsets
    /// below zero or beyond `tile_size`.
    pub fn pixel_offset(&self, lat: f64, lon: f64, tile_size: u32) -> (f64, f64) {
        let (fx, fy) = fractional_tile(lat, lon, self.zoom);
        let size = f64::from(tile_size);
        (
            (fx - f64::from(self.x)) * size,
            (fy - f64::from(self.y)) * size,
        )
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along each axis at `zoom`
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1u64 << zoom
}

/// Fractional tile position of a point, before flooring
///
/// Latitude is clamped to the Mercator-valid range.
pub fn fractional_tile(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let fx = (lon + 180.0) / 360.0 * n;
    let fy = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;
    (fx, fy)
}

/// Tile containing a geographic point
///
/// Total over all inputs: latitude beyond ±85.05° and longitude beyond ±180°
/// are clamped onto the edge tiles.
pub fn geo_to_tile(lat: f64, lon: f64, zoom: u8) -> TileCoordinate {
    let zoom = zoom.min(MAX_ZOOM);
    let max_index = (tiles_per_axis(zoom) - 1) as f64;
    let lon = if lon.is_nan() { 0.0 } else { lon.clamp(-180.0, 180.0) };
    let lat = if lat.is_nan() { 0.0 } else { lat };
    let (fx, fy) = fractional_tile(lat, lon, zoom);
    let x = fx.floor().clamp(0.0, max_index) as u32;
    let y = fy.floor().clamp(0.0, max_index) as u32;
    TileCoordinate::new(zoom, x, y)
}

/// North-west corner of a tile as (lat, lon)
///
/// Passing `(x + 1, y + 1)` gives the south-east corner.
pub fn tile_to_geo(x: u32, y: u32, zoom: u8) -> (f64, f64) {
    let n = tiles_per_axis(zoom) as f64;
    let lon = f64::from(x) / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * f64::from(y) / n)).sinh().atan();
    (lat_rad.to_degrees(), lon)
}
