//! Pyramid build errors, per-tile outcomes and layer reports

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::geometry::{Bounds, Crs};
use crate::raster::RasterError;
use crate::render::{EncodeError, NormalizationProfile};
use crate::tiles::TileCoordinate;

/// Problems that prevent a layer from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid zoom range: min {min} > max {max}")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("Zoom {0} exceeds the supported maximum of {}", crate::tiles::MAX_ZOOM)]
    ZoomTooDeep(u8),

    #[error("Tile size must be positive")]
    ZeroTileSize,

    #[error("Concurrency must be positive")]
    ZeroConcurrency,

    #[error("Invalid layer name: {0:?}")]
    InvalidLayerName(String),

    #[error("Malformed raster bounds: {0}")]
    InvalidBounds(Bounds),

    #[error("Unsupported CRS {0} (expected EPSG:4326 or EPSG:3857)")]
    UnsupportedCrs(Crs),

    #[error("Raster transform is not invertible")]
    SingularTransform,

    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },
}

/// Output persistence failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid tile key: {0}")]
    InvalidKey(String),

    #[error("Failed to write {key}: {source}")]
    WriteError {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single tile failed
#[derive(Debug, Error)]
pub enum TileError {
    #[error("read failed: {0}")]
    Read(#[from] RasterError),

    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("write failed: {0}")]
    Write(#[from] SinkError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Result of processing one tile
#[derive(Debug)]
pub enum TileOutcome {
    Written,
    /// The window had no valid data
    Skipped,
    Failed(TileError),
}

impl TileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TileOutcome::Written => "written",
            TileOutcome::Skipped => "skipped",
            TileOutcome::Failed(_) => "failed",
        }
    }
}

/// A failed tile and its reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileFailure {
    pub tile: TileCoordinate,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Completed,
    Cancelled,
}

/// Tile counts of one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ZoomCounts {
    pub zoom: u8,
    /// Tiles in the candidate rectangle before pruning
    pub candidates: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ZoomCounts {
    pub fn new(zoom: u8, candidates: u64) -> Self {
        Self {
            zoom,
            candidates,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> u64 {
        self.written + self.skipped + self.failed
    }
}

/// Machine-readable summary of one layer's build
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer: String,
    pub profile: NormalizationProfile,
    pub status: LayerStatus,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
    pub zooms: Vec<ZoomCounts>,
    pub failures: Vec<TileFailure>,
    pub elapsed_ms: u64,
}

impl LayerReport {
    pub fn new(layer: &str, profile: NormalizationProfile) -> Self {
        Self {
            layer: layer.to_string(),
            profile,
            status: LayerStatus::Completed,
            written: 0,
            skipped: 0,
            failed: 0,
            zooms: Vec::new(),
            failures: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Fold a finished zoom level into the totals
    pub fn push_zoom(&mut self, counts: ZoomCounts, failures: Vec<TileFailure>) {
        self.written += counts.written;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
        self.zooms.push(counts);
        self.failures.extend(failures);
    }

    pub fn total(&self) -> u64 {
        self.written + self.skipped + self.failed
    }

    /// Completed with no failed tile
    pub fn is_success(&self) -> bool {
        self.status == LayerStatus::Completed && self.failed == 0
    }

    pub fn zoom(&self, zoom: u8) -> Option<&ZoomCounts> {
        self.zooms.iter().find(|z| z.zoom == zoom)
    }
}

/// One raster of a directory batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<LayerReport>,
    /// Why the layer could not start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub layers: Vec<BatchEntry>,
    /// Stopped early by cancellation
    pub cancelled: bool,
}

impl BatchReport {
    pub fn written(&self) -> u64 {
        self.reports().map(|r| r.written).sum()
    }

    pub fn failed_layers(&self) -> usize {
        self.layers.iter().filter(|e| e.error.is_some()).count()
    }

    pub fn reports(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers.iter().filter_map(|e| e.report.as_ref())
    }
}
