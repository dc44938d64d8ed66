//! Lazy enumeration of the tiles covering an extent
//!
//! The candidate rectangle comes from the tiles holding the extent's NW and
//! SE corners; each candidate is then tested against the extent in tile space
//! so tiles outside the footprint are dropped before any raster I/O.

use crate::geometry::Bounds;

use super::coords::{TileCoordinate, geo_to_tile};

/// Candidate tile rectangle at one zoom level
///
/// `Copy`, so the sequence can be restarted by iterating the range again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRange {
    zoom: u8,
    bounds: Bounds,
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
}

impl TileRange {
    /// Candidate rectangle covering a WGS84 extent at `zoom`
    pub fn new(bounds: Bounds, zoom: u8) -> Self {
        let nw = geo_to_tile(bounds.north, bounds.west, zoom);
        let se = geo_to_tile(bounds.south, bounds.east, zoom);
        Self {
            zoom: nw.zoom,
            bounds,
            min_x: nw.x.min(se.x),
            max_x: nw.x.max(se.x),
            min_y: nw.y.min(se.y),
            max_y: nw.y.max(se.y),
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Inclusive column range
    pub fn columns(&self) -> (u32, u32) {
        (self.min_x, self.max_x)
    }

    /// Inclusive row range
    pub fn rows(&self) -> (u32, u32) {
        (self.min_y, self.max_y)
    }

    /// Number of candidates before the overlap test
    pub fn candidate_count(&self) -> u64 {
        u64::from(self.max_x - self.min_x + 1) * u64::from(self.max_y - self.min_y + 1)
    }

    pub fn iter(&self) -> TileIter {
        TileIter {
            range: *self,
            next_x: self.min_x,
            next_y: self.min_y,
            done: false,
        }
    }
}

impl IntoIterator for TileRange {
    type Item = TileCoordinate;
    type IntoIter = TileIter;

    fn into_iter(self) -> TileIter {
        self.iter()
    }
}

impl IntoIterator for &TileRange {
    type Item = TileCoordinate;
    type IntoIter = TileIter;

    fn into_iter(self) -> TileIter {
        self.iter()
    }
}

/// Column-major walk over a [`TileRange`], yielding only overlapping tiles
#[derive(Debug, Clone)]
pub struct TileIter {
    range: TileRange,
    next_x: u32,
    next_y: u32,
    done: bool,
}

impl TileIter {
    fn advance(&mut self) {
        if self.next_y < self.range.max_y {
            self.next_y += 1;
        } else if self.next_x < self.range.max_x {
            self.next_x += 1;
            self.next_y = self.range.min_y;
        } else {
            self.done = true;
        }
    }
}

impl Iterator for TileIter {
    type Item = TileCoordinate;

    fn next(&mut self) -> Option<TileCoordinate> {
        while !self.done {
            let tile = TileCoordinate::new(self.range.zoom, self.next_x, self.next_y);
            self.advance();
            if tile.bounds().intersects(&self.range.bounds) {
                return Some(tile);
            }
        }
        None
    }
}

/// Tiles at `zoom` whose bounds overlap a WGS84 extent
pub fn tiles_intersecting(bounds: &Bounds, zoom: u8) -> TileRange {
    TileRange::new(*bounds, zoom)
}
