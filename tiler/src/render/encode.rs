//! Tile image encoding

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("PNG encoding failed: {0}")]
    Png(image::ImageError),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(image::ImageError),
}

/// Output image format of tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// Lossless, keeps the alpha channel
    #[default]
    Png,
    /// Lossy; transparent pixels become black
    Jpeg,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileFormat::Png => f.write_str("png"),
            TileFormat::Jpeg => f.write_str("jpeg"),
        }
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpeg" | "jpg" => Ok(TileFormat::Jpeg),
            other => Err(format!("unknown tile format '{}' (expected png or jpeg)", other)),
        }
    }
}

/// How rendered tiles are serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: TileFormat,
    pub jpeg_quality: u8,
    /// Keep the alpha channel (PNG only)
    pub alpha: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format: TileFormat::Png,
            jpeg_quality: 85,
            alpha: true,
        }
    }
}

/// Encode a tile; output is a pure function of the pixels and options
pub fn encode_tile(image: &RgbaImage, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    match options.format {
        TileFormat::Png if options.alpha => {
            PngEncoder::new(&mut buffer)
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(EncodeError::Png)?;
        }
        TileFormat::Png => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            PngEncoder::new(&mut buffer)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(EncodeError::Png)?;
        }
        TileFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, options.jpeg_quality)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(EncodeError::Jpeg)?;
        }
    }
    Ok(buffer)
}
