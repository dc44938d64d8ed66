//! Test Utilities Module
//!
//! Fixtures shared by the unit tests: synthetic rasters over a small region
//! of Mauritius and a GeoTIFF writer.
//! This module is only compiled when running tests.

#![cfg(test)]

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ndarray::Array2;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::geometry::{Bounds, Crs};
use crate::raster::{ArrayRasterSource, GeoTransform};

// ============================================================================
// Synthetic rasters
// ============================================================================

/// West, south, east, north of the synthetic test region
pub const MAURITIUS: Bounds = Bounds {
    west: 57.3,
    south: -20.5,
    east: 57.8,
    north: -19.9,
};

/// North-up transform stretching `width` x `height` pixels over `bounds`
pub fn transform_for(bounds: &Bounds, width: usize, height: usize) -> GeoTransform {
    GeoTransform::north_up(
        bounds.west,
        bounds.north,
        bounds.width() / width as f64,
        bounds.height() / height as f64,
    )
}

/// Diagonal ramp in [-0.2, 1.0], like an NDVI band
pub fn ndvi_ramp(width: usize, height: usize) -> Array2<f32> {
    let span = (width + height).saturating_sub(2).max(1) as f32;
    Array2::from_shape_fn((height, width), |(r, c)| -0.2 + 1.2 * (r + c) as f32 / span)
}

/// Single-band WGS84 source over [`MAURITIUS`]
pub fn mauritius_source(width: usize, height: usize) -> ArrayRasterSource {
    ArrayRasterSource::from_band(
        ndvi_ramp(width, height),
        transform_for(&MAURITIUS, width, height),
        Crs::Wgs84,
    )
}

// ============================================================================
// GeoTIFF fixture
// ============================================================================

/// Write a float32 GeoTIFF over [`MAURITIUS`] whose pixel (col, row) holds
/// `row * width + col`; pixel (0, 0) holds `nodata` when given.
pub fn write_test_geotiff(path: &Path, width: u32, height: u32, nodata: Option<f32>) {
    let mut data: Vec<f32> = (0..width * height).map(|i| i as f32).collect();
    if let Some(value) = nodata {
        data[0] = value;
    }

    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .unwrap();

    let scale = [
        MAURITIUS.width() / f64::from(width),
        MAURITIUS.height() / f64::from(height),
        0.0,
    ];
    let tiepoint = [0.0, 0.0, 0.0, MAURITIUS.west, MAURITIUS.north, 0.0];
    let geokeys: [u16; 16] = [
        1, 1, 0, 3, // header
        1024, 0, 1, 2, // GTModelType = geographic
        1025, 0, 1, 1, // GTRasterType = PixelIsArea
        2048, 0, 1, 4326, // GeographicType
    ];

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(33550), &scale[..]).unwrap();
    dir.write_tag(Tag::Unknown(33922), &tiepoint[..]).unwrap();
    dir.write_tag(Tag::Unknown(34735), &geokeys[..]).unwrap();
    if let Some(value) = nodata {
        dir.write_tag(Tag::Unknown(42113), value.to_string().as_str())
            .unwrap();
    }

    image.write_data(&data).unwrap();
}
