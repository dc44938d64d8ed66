//! Directory batch: one layer per GeoTIFF

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::raster::{GeoTiffSource, RasterSource};

use super::builder::{PyramidBuilder, layer_key};
use super::types::{BatchEntry, BatchReport, LayerStatus};

/// Extensions picked up by [`discover_rasters`], compared case-insensitively
const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// GeoTIFF files directly inside `dir`, sorted by path
pub fn discover_rasters(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path()));
    let rasters = collect_rasters(dir, entries);
    info!("Found {} rasters in {:?}", rasters.len(), dir);
    Ok(rasters)
}

/// Keep raster files among directory entries; unreadable entries are logged
fn collect_rasters<I>(dir: &Path, entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = std::io::Result<PathBuf>>,
{
    let mut rasters = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        if let Some(ext) = ext
            && RASTER_EXTENSIONS.contains(&ext.as_str())
        {
            rasters.push(path);
        }
    }
    rasters.sort();
    rasters
}

/// Layer name of a raster file: its stem
pub fn layer_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Build a pyramid for every GeoTIFF in `dir`
///
/// A raster that cannot be opened or planned is recorded with its error and
/// the batch moves on. Cancellation stops the batch before the next layer.
pub async fn build_directory(builder: &PyramidBuilder, dir: &Path) -> std::io::Result<BatchReport> {
    let mut report = BatchReport::default();
    let cancel = builder.cancel_token();

    for path in discover_rasters(dir)? {
        if cancel.is_cancelled() {
            warn!("Batch cancelled before {:?}", path);
            report.cancelled = true;
            break;
        }

        let name = layer_name(&path);
        let layer = layer_key(&name).unwrap_or_else(|_| name.clone());
        let mut entry = BatchEntry {
            path: path.clone(),
            layer,
            report: None,
            error: None,
        };

        let open_path = path.clone();
        let opened = tokio::task::spawn_blocking(move || GeoTiffSource::open(&open_path)).await;
        let source: Arc<dyn RasterSource> = match opened {
            Ok(Ok(source)) => Arc::new(source),
            Ok(Err(e)) => {
                error!("Failed to open {:?}: {}", path, e);
                entry.error = Some(e.to_string());
                report.layers.push(entry);
                continue;
            }
            Err(e) => {
                error!("Worker failed opening {:?}: {}", path, e);
                entry.error = Some(e.to_string());
                report.layers.push(entry);
                continue;
            }
        };

        match builder.build_layer(&name, source).await {
            Ok(layer_report) => {
                if layer_report.status == LayerStatus::Cancelled {
                    report.cancelled = true;
                }
                entry.report = Some(layer_report);
            }
            Err(e) => {
                error!("Layer {} not built: {}", name, e);
                entry.error = Some(e.to_string());
            }
        }
        report.layers.push(entry);
    }

    info!(
        "Batch done: {} layers, {} tiles written, {} layers failed to start",
        report.layers.len(),
        report.written(),
        report.failed_layers()
    );
    Ok(report)
}
