//! Common Test Utilities for Integration Tests
//!
//! Synthetic rasters, fault-injecting sources and GeoTIFF fixtures shared by
//! the integration test modules.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use ndarray::Array2;
use raster_pyramid::geometry::{Bounds, Crs};
use raster_pyramid::pyramid::{BuildOptions, CancelToken, MemoryTileSink};
use raster_pyramid::raster::{
    ArrayRasterSource, GeoTransform, PixelWindow, RasterError, RasterSource,
};
use sha2::{Digest, Sha256};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

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

/// Single-band WGS84 raster over [`MAURITIUS`] with NDVI-like values
pub fn mauritius_source(width: usize, height: usize) -> ArrayRasterSource {
    let span = (width + height - 2) as f32;
    let band = Array2::from_shape_fn((height, width), |(r, c)| {
        let wave = ((r as f32 * 0.05).sin() * (c as f32 * 0.07).cos()) * 0.1;
        -0.2 + 1.2 * (r + c) as f32 / span + wave
    });
    ArrayRasterSource::from_band(band, transform_for(&MAURITIUS, width, height), Crs::Wgs84)
}

/// Build options over a zoom range with a fixed worker count
pub fn options(min_zoom: u8, max_zoom: u8) -> BuildOptions {
    BuildOptions {
        min_zoom,
        max_zoom,
        concurrency: 4,
        ..BuildOptions::default()
    }
}

/// SHA-256 of every stored object, keyed by store key
pub fn digest_sink(sink: &MemoryTileSink) -> BTreeMap<String, String> {
    sink.keys()
        .into_iter()
        .filter_map(|key| {
            let bytes = sink.get(&key)?;
            Some((key, format!("{:x}", Sha256::digest(&bytes))))
        })
        .collect()
}

/// Tile keys only, without layer manifests
pub fn tile_keys(sink: &MemoryTileSink) -> Vec<String> {
    sink.keys()
        .into_iter()
        .filter(|k| !k.ends_with("metadata.json"))
        .collect()
}

/// Parse `{layer}/{z}/{x}/{y}.{ext}` into `(z, x, y)`
pub fn parse_tile_key(key: &str) -> Option<(u8, u32, u32)> {
    let mut parts = key.split('/').skip(1);
    let z = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.split('.').next()?.parse().ok()?;
    Some((z, x, y))
}

// ============================================================================
// Fault-injecting sources
// ============================================================================

/// Source that fails reads of exactly one pixel window
pub struct FailingSource<S> {
    pub inner: S,
    pub fail_on: PixelWindow,
}

impl<S: RasterSource> RasterSource for FailingSource<S> {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn band_count(&self) -> usize {
        self.inner.band_count()
    }

    fn transform(&self) -> GeoTransform {
        self.inner.transform()
    }

    fn crs(&self) -> Crs {
        self.inner.crs()
    }

    fn nodata(&self) -> Option<f64> {
        self.inner.nodata()
    }

    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError> {
        if window == self.fail_on {
            return Err(RasterError::ReadError(format!("injected failure at {}", window)));
        }
        self.inner.read_window(band, window)
    }
}

/// Source that trips a cancel token on its first read
pub struct CancellingSource<S> {
    pub inner: S,
    pub cancel: CancelToken,
}

impl<S: RasterSource> RasterSource for CancellingSource<S> {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn band_count(&self) -> usize {
        self.inner.band_count()
    }

    fn transform(&self) -> GeoTransform {
        self.inner.transform()
    }

    fn crs(&self) -> Crs {
        self.inner.crs()
    }

    fn nodata(&self) -> Option<f64> {
        self.inner.nodata()
    }

    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError> {
        self.cancel.cancel();
        self.inner.read_window(band, window)
    }
}

/// Source whose reads block for a fixed delay
pub struct SlowSource<S> {
    pub inner: S,
    pub delay: Duration,
}

impl<S: RasterSource> RasterSource for SlowSource<S> {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn band_count(&self) -> usize {
        self.inner.band_count()
    }

    fn transform(&self) -> GeoTransform {
        self.inner.transform()
    }

    fn crs(&self) -> Crs {
        self.inner.crs()
    }

    fn nodata(&self) -> Option<f64> {
        self.inner.nodata()
    }

    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError> {
        std::thread::sleep(self.delay);
        self.inner.read_window(band, window)
    }
}

// ============================================================================
// GeoTIFF fixture
// ============================================================================

/// Write a float32 EPSG:4326 GeoTIFF over [`MAURITIUS`] with a gradient band
/// and `-9999` as no-data along the first row
pub fn write_geotiff(path: &Path, width: u32, height: u32) {
    let data: Vec<f32> = (0..height)
        .flat_map(|r| {
            (0..width).map(move |c| {
                if r == 0 {
                    -9999.0
                } else {
                    (r + c) as f32 / (width + height) as f32
                }
            })
        })
        .collect();

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
        1024, 0, 1, 2, // geographic model
        1025, 0, 1, 1, // pixel is area
        2048, 0, 1, 4326,
    ];

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(33550), &scale[..]).unwrap();
    dir.write_tag(Tag::Unknown(33922), &tiepoint[..]).unwrap();
    dir.write_tag(Tag::Unknown(34735), &geokeys[..]).unwrap();
    dir.write_tag(Tag::Unknown(42113), "-9999").unwrap();

    image.write_data(&data).unwrap();
}
