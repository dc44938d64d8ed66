//! Geographic extents and coordinate reference systems

pub mod projection;

pub use projection::Crs;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned extent (west, south, east, north) in some CRS
///
/// For geographic extents the values are degrees (longitude on the x axis,
/// latitude on the y axis). Projected extents use the CRS's native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest extent containing all the given points
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            bounds.west = bounds.west.min(x);
            bounds.east = bounds.east.max(x);
            bounds.south = bounds.south.min(y);
            bounds.north = bounds.north.max(y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center as (x, y), i.e. (lon, lat) for geographic extents
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Corners as (x, y) pairs: NW, NE, SW, SE
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.west, self.north),
            (self.east, self.north),
            (self.west, self.south),
            (self.east, self.south),
        ]
    }

    /// Finite and non-degenerate (west < east, south < north)
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.west < self.east
            && self.south < self.north
    }

    /// Closed-interval overlap: extents that only touch along an edge intersect
    pub fn intersects(&self, other: &Bounds) -> bool {
        !(self.east < other.west
            || self.west > other.east
            || self.north < other.south
            || self.south > other.north)
    }

    /// Open-interval overlap: touching edges do not count
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Leaflet `LatLngBounds` layout: `[[south, west], [north, east]]`
    pub fn to_leaflet(&self) -> [[f64; 2]; 2] {
        [[self.south, self.west], [self.north, self.east]]
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.west, self.south, self.east, self.north
        )
    }
}

impl FromStr for Bounds {
    type Err = String;

    /// Parses `west,south,east,north`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            return Err("Expected 'west,south,east,north'".into());
        }
        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|e| format!("invalid coordinate '{}': {}", part, e))?;
        }
        let bounds = Bounds::new(values[0], values[1], values[2], values[3]);
        if !bounds.is_valid() {
            return Err(format!("degenerate bounds {}", bounds));
        }
        Ok(bounds)
    }
}
