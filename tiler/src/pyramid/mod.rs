//! Tile pyramid generation
//!
//! This module provides:
//! - `PyramidBuilder` driving read -> render -> encode -> write per tile
//! - `TileSink` stores (filesystem and in-memory)
//! - Per-layer reports, manifests, cancellation and directory batches

mod batch;
mod builder;
mod cancel;
mod manifest;
mod sink;
mod types;

pub use batch::{build_directory, discover_rasters, layer_name};
pub use builder::{BuildOptions, LayerPlan, PyramidBuilder, layer_key, render_tile};
pub use cancel::CancelToken;
pub use manifest::LayerManifest;
pub use sink::{FsTileSink, MemoryTileSink, TileSink, tile_key};
pub use types::{
    BatchEntry, BatchReport, ConfigError, LayerReport, LayerStatus, SinkError, TileError,
    TileFailure, TileOutcome, ZoomCounts,
};
