//! Web Mercator math and the small set of CRSs the tiler understands
//!
//! Sources are expected in geographic WGS84 (EPSG:4326) or Web Mercator
//! (EPSG:3857). Both convert to and from WGS84 in closed form, so tile
//! bounds can be mapped into the source CRS corner by corner.

use serde::Serialize;
use std::f64::consts::PI;
use std::fmt;

use super::Bounds;

/// WGS84 semi-major axis used by EPSG:3857
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which the Web Mercator square ends (`atan(sinh(π))`)
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Half the Web Mercator extent in metres
pub const MERCATOR_HALF_EXTENT: f64 = PI * EARTH_RADIUS;

/// Longitude/latitude (degrees) to Web Mercator metres; latitude is clamped
#[inline]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * lat.to_radians().tan().asinh();
    (x, y)
}

/// Web Mercator metres to longitude/latitude (degrees)
#[inline]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lon, lat)
}

/// Coordinate reference system of a raster source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Crs {
    /// EPSG:4326, longitude/latitude degrees
    Wgs84,
    /// EPSG:3857, spherical Mercator metres
    WebMercator,
    /// Any other EPSG code; carried for reporting but not tileable
    Epsg(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900913 => Crs::WebMercator,
            other => Crs::Epsg(other),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Epsg(code) => *code,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Crs::Epsg(_))
    }

    /// Native (x, y) to WGS84 (lon, lat)
    pub fn to_wgs84(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Crs::Wgs84 => Some((x, y)),
            Crs::WebMercator => Some(mercator_to_lon_lat(x, y)),
            Crs::Epsg(_) => None,
        }
    }

    /// WGS84 (lon, lat) to native (x, y)
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match self {
            Crs::Wgs84 => Some((lon, lat)),
            Crs::WebMercator => Some(lon_lat_to_mercator(lon, lat)),
            Crs::Epsg(_) => None,
        }
    }

    /// Convert an extent to WGS84 through its four corners
    pub fn bounds_to_wgs84(&self, bounds: &Bounds) -> Option<Bounds> {
        let corners = bounds
            .corners()
            .iter()
            .map(|&(x, y)| self.to_wgs84(x, y))
            .collect::<Option<Vec<_>>>()?;
        Bounds::from_points(&corners)
    }

    /// Convert a WGS84 extent into this CRS through its four corners
    pub fn bounds_from_wgs84(&self, bounds: &Bounds) -> Option<Bounds> {
        let corners = bounds
            .corners()
            .iter()
            .map(|&(lon, lat)| self.from_wgs84(lon, lat))
            .collect::<Option<Vec<_>>>()?;
        Bounds::from_points(&corners)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}
