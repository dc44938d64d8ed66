//! Turning raw band samples into encoded tile images
//!
//! This module provides:
//! - Normalization profiles and the `ProfileRules` layer-name lookup
//! - `normalize` (8-bit stretch) and `colorize` (channel assignment)
//! - `resample` / `compose_tile` to the canonical tile size
//! - `encode_tile` (PNG / JPEG) and whole-raster overlay export

mod color;
mod encode;
mod normalize;
mod overlay;
mod profile;
mod resample;

pub use color::{TRANSPARENT, colorize, colorize_band};
pub use encode::{EncodeError, EncodeOptions, TileFormat, encode_tile};
pub use normalize::{normalize, normalize_range, percentile, scale_value};
pub use overlay::{OverlayInfo, render_overlay};
pub use profile::{NormalizationProfile, ProfileRules, Transfer};
pub use resample::{Placement, ResamplingMethod, TILE_SIZE, compose_tile, resample};
