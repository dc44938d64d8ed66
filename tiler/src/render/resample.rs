//! Resampling windows to the canonical tile size
//!
//! A window is resized to its footprint inside the tile and pasted at its
//! offset on a transparent canvas. Snapped windows overhang the tile and are
//! cropped by the paste, so tile pixels stay registered to tile bounds.
//!
//! Windows holding no-data are resized with premultiplied alpha, and the
//! resized coverage is thresholded at one half: colors never bleed toward
//! the transparent black of no-data and filter ringing leaves no ghosts.

use image::imageops::{self, FilterType};
use image::{Rgba, Rgba32FImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geometry::Bounds;
use crate::tiles::TileCoordinate;

use super::color::TRANSPARENT;

/// Edge length of a map tile in pixels
pub const TILE_SIZE: u32 = 256;

/// Footprints beyond this multiple of the tile size are sampled directly
const MAX_FOOTPRINT_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Lanczos windowed sinc, radius 3
    #[default]
    Lanczos3,
    Nearest,
}

impl ResamplingMethod {
    fn filter(&self) -> FilterType {
        match self {
            ResamplingMethod::Lanczos3 => FilterType::Lanczos3,
            ResamplingMethod::Nearest => FilterType::Nearest,
        }
    }
}

impl fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResamplingMethod::Lanczos3 => f.write_str("lanczos3"),
            ResamplingMethod::Nearest => f.write_str("nearest"),
        }
    }
}

impl FromStr for ResamplingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lanczos3" | "lanczos" => Ok(ResamplingMethod::Lanczos3),
            "nearest" => Ok(ResamplingMethod::Nearest),
            other => Err(format!("unknown resampling method '{}'", other)),
        }
    }
}

/// Resize to `size` x `size`; no-op when the shape already matches
pub fn resample(image: &RgbaImage, size: u32, method: ResamplingMethod) -> RgbaImage {
    resize_to(image, size, size, method)
}

fn resize_to(image: &RgbaImage, width: u32, height: u32, method: ResamplingMethod) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    if image.pixels().all(|p| p[3] == u8::MAX) {
        return imageops::resize(image, width, height, method.filter());
    }
    resize_premultiplied(image, width, height, method)
}

/// Resize in premultiplied float space, then restore straight alpha
///
/// Output alpha is binary: coverage below one half becomes no-data.
fn resize_premultiplied(
    image: &RgbaImage,
    width: u32,
    height: u32,
    method: ResamplingMethod,
) -> RgbaImage {
    let premultiplied = Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        Rgba([
            f32::from(r) / 255.0 * alpha,
            f32::from(g) / 255.0 * alpha,
            f32::from(b) / 255.0 * alpha,
            alpha,
        ])
    });
    let resized = imageops::resize(&premultiplied, width, height, method.filter());

    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = resized.get_pixel(x, y).0;
        if a < 0.5 {
            return TRANSPARENT;
        }
        let straight = |c: f32| ((c / a).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([straight(r), straight(g), straight(b), u8::MAX])
    })
}

/// Pixel rectangle a window occupies inside a tile
///
/// Offsets may be negative and the rectangle may extend past the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Footprint of a WGS84 extent inside `tile`
    pub fn for_extent(tile: &TileCoordinate, extent: &Bounds, tile_size: u32) -> Self {
        let (x0, y0) = tile.pixel_offset(extent.north, extent.west, tile_size);
        let (x1, y1) = tile.pixel_offset(extent.south, extent.east, tile_size);
        let (x0, y0, x1, y1) = (x0.round(), y0.round(), x1.round(), y1.round());
        Self {
            x: x0 as i64,
            y: y0 as i64,
            width: (x1 - x0).max(1.0) as u32,
            height: (y1 - y0).max(1.0) as u32,
        }
    }

    /// Whether the footprint is exactly the tile
    pub fn is_exact(&self, tile_size: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == tile_size && self.height == tile_size
    }
}

/// Fit a colored window into a `tile_size` tile
pub fn compose_tile(
    image: &RgbaImage,
    placement: &Placement,
    tile_size: u32,
    method: ResamplingMethod,
) -> RgbaImage {
    let limit = tile_size.saturating_mul(MAX_FOOTPRINT_FACTOR);
    if placement.width > limit || placement.height > limit {
        return place_nearest(image, placement, tile_size);
    }

    let footprint = resize_to(image, placement.width, placement.height, method);
    if placement.is_exact(tile_size) {
        return footprint;
    }
    let mut canvas = RgbaImage::from_pixel(tile_size, tile_size, TRANSPARENT);
    imageops::replace(&mut canvas, &footprint, placement.x, placement.y);
    canvas
}

/// Map each covered tile pixel to its nearest window pixel
fn place_nearest(image: &RgbaImage, placement: &Placement, tile_size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(tile_size, tile_size, TRANSPARENT);
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return canvas;
    }
    let x_scale = f64::from(src_w) / f64::from(placement.width);
    let y_scale = f64::from(src_h) / f64::from(placement.height);

    for (tx, ty, pixel) in canvas.enumerate_pixels_mut() {
        let dx = i64::from(tx) - placement.x;
        let dy = i64::from(ty) - placement.y;
        if dx < 0 || dy < 0 || dx >= i64::from(placement.width) || dy >= i64::from(placement.height)
        {
            continue;
        }
        let sx = (((dx as f64) + 0.5) * x_scale) as u32;
        let sy = (((dy as f64) + 0.5) * y_scale) as u32;
        *pixel = *image.get_pixel(sx.min(src_w - 1), sy.min(src_h - 1));
    }
    canvas
}
