//! Tile pyramid builder
//!
//! A layer goes Opened -> zoom by zoom -> Closed (or Cancelled). Before any
//! tile work the layer is planned: options and source georeferencing are
//! validated and the normalization profile is fixed. Within a zoom level the
//! pruned tile sequence is streamed into blocking render tasks, at most
//! `concurrency` in flight. Every tile ends Written, Skipped or Failed; a
//! failed tile never stops its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{StreamExt, future, stream};
use metrics::{counter, histogram};
use tracing::{debug, info, trace, warn};

use crate::geometry::Bounds;
use crate::raster::{RasterSource, WindowResult, read_window};
use crate::render::{
    EncodeOptions, NormalizationProfile, Placement, ProfileRules, ResamplingMethod, TILE_SIZE,
    colorize_band, compose_tile, encode_tile, normalize,
};
use crate::tiles::{MAX_ZOOM, TileCoordinate, tiles_intersecting};

use super::cancel::CancelToken;
use super::manifest::LayerManifest;
use super::sink::{TileSink, tile_key};
use super::types::{
    ConfigError, LayerReport, LayerStatus, TileError, TileFailure, TileOutcome, ZoomCounts,
};

/// Knobs of a pyramid build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    /// One-based band index
    pub band: usize,
    /// Maximum tiles in flight
    pub concurrency: usize,
    pub encode: EncodeOptions,
    pub resampling: ResamplingMethod,
    pub tile_timeout: Option<Duration>,
    /// Bypasses `profile_rules` when set
    pub profile: Option<NormalizationProfile>,
    pub profile_rules: ProfileRules,
    /// Write `{layer}/metadata.json` after the layer closes
    pub write_manifest: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            min_zoom: 12,
            max_zoom: 16,
            tile_size: TILE_SIZE,
            band: 1,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            encode: EncodeOptions::default(),
            resampling: ResamplingMethod::default(),
            tile_timeout: None,
            profile: None,
            profile_rules: ProfileRules::builtin(),
            write_manifest: true,
        }
    }
}

/// Everything fixed at layer start
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    /// Sanitized layer name, used as the store key prefix
    pub layer: String,
    pub profile: NormalizationProfile,
    /// WGS84 extent of the source
    pub bounds: Bounds,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    /// Zero-based band index
    pub band_index: usize,
    pub encode: EncodeOptions,
    pub resampling: ResamplingMethod,
}

/// Layer name as used in store keys
///
/// Characters other than alphanumerics, `-`, `_` and `.` become `_`. Names
/// that end up empty or made only of dots are rejected.
pub fn layer_key(name: &str) -> Result<String, ConfigError> {
    let key: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if key.is_empty() || key.chars().all(|c| c == '.') {
        return Err(ConfigError::InvalidLayerName(name.to_string()));
    }
    Ok(key)
}

/// Read, normalize, color, resample and encode one tile
///
/// `Ok(None)` means the tile has no valid data.
pub fn render_tile<S: RasterSource + ?Sized>(
    source: &S,
    plan: &LayerPlan,
    tile: &TileCoordinate,
) -> Result<Option<Vec<u8>>, TileError> {
    let read_start = Instant::now();
    let window = read_window(source, &tile.bounds(), plan.band_index)?;
    histogram!("raster_pyramid_tile_phase_duration_seconds", "phase" => "read")
        .record(read_start.elapsed());

    let data = match window {
        WindowResult::Empty => return Ok(None),
        WindowResult::Data(data) => data,
    };

    let render_start = Instant::now();
    let normalized = normalize(data.values.view(), plan.profile);
    let colored = colorize_band(&normalized, plan.profile);
    let placement = Placement::for_extent(tile, &data.extent, plan.tile_size);
    let image = compose_tile(&colored, &placement, plan.tile_size, plan.resampling);
    histogram!("raster_pyramid_tile_phase_duration_seconds", "phase" => "render")
        .record(render_start.elapsed());

    let encode_start = Instant::now();
    let bytes = encode_tile(&image, &plan.encode)?;
    histogram!("raster_pyramid_tile_phase_duration_seconds", "phase" => "encode")
        .record(encode_start.elapsed());

    Ok(Some(bytes))
}

/// Shared state of one layer's tile tasks
struct TileContext {
    source: Arc<dyn RasterSource>,
    sink: Arc<dyn TileSink>,
    plan: LayerPlan,
}

impl TileContext {
    fn process(&self, tile: &TileCoordinate) -> TileOutcome {
        let bytes = match render_tile(self.source.as_ref(), &self.plan, tile) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return TileOutcome::Skipped,
            Err(e) => return TileOutcome::Failed(e),
        };

        let write_start = Instant::now();
        let key = tile_key(&self.plan.layer, tile, self.plan.encode.format);
        let result = self.sink.put(&key, &bytes);
        histogram!("raster_pyramid_tile_phase_duration_seconds", "phase" => "write")
            .record(write_start.elapsed());

        match result {
            Ok(()) => TileOutcome::Written,
            Err(e) => TileOutcome::Failed(TileError::Write(e)),
        }
    }
}

/// Run one tile on the blocking pool, bounded by `timeout`
///
/// A timed-out task is abandoned, not aborted: blocking work cannot be
/// interrupted, so it finishes in the background and its result is dropped.
async fn run_tile(
    ctx: Arc<TileContext>,
    tile: TileCoordinate,
    timeout: Option<Duration>,
) -> TileOutcome {
    let handle = tokio::task::spawn_blocking(move || ctx.process(&tile));
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return TileOutcome::Failed(TileError::Timeout(limit)),
        },
        None => handle.await,
    };
    joined.unwrap_or_else(|e| TileOutcome::Failed(TileError::Worker(e.to_string())))
}

/// Builds tile pyramids into a sink
pub struct PyramidBuilder {
    options: BuildOptions,
    sink: Arc<dyn TileSink>,
    cancel: CancelToken,
}

impl PyramidBuilder {
    pub fn new(options: BuildOptions, sink: Arc<dyn TileSink>) -> Self {
        Self {
            options,
            sink,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Validate options against a source and fix the layer's parameters
    pub fn plan<S: RasterSource + ?Sized>(
        &self,
        layer: &str,
        source: &S,
    ) -> Result<LayerPlan, ConfigError> {
        let o = &self.options;
        if o.min_zoom > o.max_zoom {
            return Err(ConfigError::InvalidZoomRange {
                min: o.min_zoom,
                max: o.max_zoom,
            });
        }
        if o.max_zoom > MAX_ZOOM {
            return Err(ConfigError::ZoomTooDeep(o.max_zoom));
        }
        if o.tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if o.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let key = layer_key(layer)?;

        let crs = source.crs();
        if !crs.is_supported() {
            return Err(ConfigError::UnsupportedCrs(crs));
        }
        if !source.transform().is_invertible() {
            return Err(ConfigError::SingularTransform);
        }
        let native = source.bounds();
        if !native.is_valid() {
            return Err(ConfigError::InvalidBounds(native));
        }
        let bounds = crs
            .bounds_to_wgs84(&native)
            .filter(|b| b.is_valid())
            .ok_or(ConfigError::InvalidBounds(native))?;

        if o.band == 0 || o.band > source.band_count() {
            return Err(ConfigError::BandOutOfRange {
                band: o.band,
                count: source.band_count(),
            });
        }

        let profile = o
            .profile
            .unwrap_or_else(|| o.profile_rules.resolve(layer));

        Ok(LayerPlan {
            layer: key,
            profile,
            bounds,
            min_zoom: o.min_zoom,
            max_zoom: o.max_zoom,
            tile_size: o.tile_size,
            band_index: o.band - 1,
            encode: o.encode,
            resampling: o.resampling,
        })
    }

    /// Build every zoom level of one layer
    ///
    /// Only configuration problems are errors; per-tile failures land in the
    /// report. The source is released when this returns.
    pub async fn build_layer(
        &self,
        layer: &str,
        source: Arc<dyn RasterSource>,
    ) -> Result<LayerReport, ConfigError> {
        let started = Instant::now();
        let plan = self.plan(layer, source.as_ref())?;
        info!(
            "Layer {} opened: profile={}, bounds={}, zoom {}..={}",
            plan.layer, plan.profile, plan.bounds, plan.min_zoom, plan.max_zoom
        );

        let mut report = LayerReport::new(&plan.layer, plan.profile);
        let ctx = Arc::new(TileContext {
            source,
            sink: Arc::clone(&self.sink),
            plan: plan.clone(),
        });

        for zoom in plan.min_zoom..=plan.max_zoom {
            if self.cancel.is_cancelled() {
                report.status = LayerStatus::Cancelled;
                break;
            }
            let (counts, failures, interrupted) = self.build_zoom(&ctx, zoom).await;
            info!(
                "Layer {} zoom {}: {} written, {} skipped, {} failed ({} candidates)",
                plan.layer, zoom, counts.written, counts.skipped, counts.failed, counts.candidates
            );
            report.push_zoom(counts, failures);
            if interrupted {
                report.status = LayerStatus::Cancelled;
                break;
            }
        }
        drop(ctx);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        match report.status {
            LayerStatus::Completed => info!(
                "Layer {} closed: {} written, {} skipped, {} failed in {} ms",
                report.layer, report.written, report.skipped, report.failed, report.elapsed_ms
            ),
            LayerStatus::Cancelled => warn!(
                "Layer {} cancelled: {} written, {} skipped, {} failed before stopping",
                report.layer, report.written, report.skipped, report.failed
            ),
        }

        if self.options.write_manifest {
            self.write_manifest(&plan, &report);
        }
        Ok(report)
    }

    /// Returns the zoom's counts, its failures and whether cancellation cut it short
    async fn build_zoom(
        &self,
        ctx: &Arc<TileContext>,
        zoom: u8,
    ) -> (ZoomCounts, Vec<TileFailure>, bool) {
        let range = tiles_intersecting(&ctx.plan.bounds, zoom);
        let mut counts = ZoomCounts::new(zoom, range.candidate_count());
        let mut failures = Vec::new();
        let timeout = self.options.tile_timeout;
        debug!(
            "Zoom {}: columns {:?}, rows {:?}",
            zoom,
            range.columns(),
            range.rows()
        );

        let mut interrupted = false;
        let mut outcomes = stream::iter(range)
            .take_while(|_| {
                let go = !self.cancel.is_cancelled();
                interrupted |= !go;
                future::ready(go)
            })
            .map(|tile| {
                let ctx = Arc::clone(ctx);
                async move { (tile, run_tile(ctx, tile, timeout).await) }
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((tile, outcome)) = outcomes.next().await {
            counter!("raster_pyramid_tiles_total", "outcome" => outcome.label()).increment(1);
            match outcome {
                TileOutcome::Written => counts.written += 1,
                TileOutcome::Skipped => {
                    trace!("Tile {} has no data", tile);
                    counts.skipped += 1;
                }
                TileOutcome::Failed(e) => {
                    warn!("Tile {} failed: {}", tile, e);
                    counts.failed += 1;
                    failures.push(TileFailure {
                        tile,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(outcomes);

        (counts, failures, interrupted)
    }

    fn write_manifest(&self, plan: &LayerPlan, report: &LayerReport) {
        let manifest = LayerManifest::new(
            report,
            plan.bounds,
            plan.min_zoom,
            plan.max_zoom,
            plan.tile_size,
            plan.encode.format,
        );
        let key = LayerManifest::key(&plan.layer);
        let result = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| e.to_string())
            .and_then(|json| self.sink.put(&key, &json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Failed to write manifest {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Crs;
    use crate::pyramid::MemoryTileSink;
    use crate::raster::{ArrayRasterSource, GeoTransform};
    use crate::test_utils::{MAURITIUS, mauritius_source};
    use ndarray::Array2;

    fn memory_builder(options: BuildOptions) -> (PyramidBuilder, Arc<MemoryTileSink>) {
        let sink = Arc::new(MemoryTileSink::new());
        (PyramidBuilder::new(options, sink.clone()), sink)
    }

    fn zooms(min_zoom: u8, max_zoom: u8) -> BuildOptions {
        BuildOptions {
            min_zoom,
            max_zoom,
            concurrency: 4,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_layer_key() {
        assert_eq!(layer_key("NDVI 2023/north").unwrap(), "NDVI_2023_north");
        assert_eq!(layer_key("soil.v2").unwrap(), "soil.v2");
        assert!(layer_key("").is_err());
        assert!(layer_key("..").is_err());
        assert!(layer_key("  ").is_err());
    }

    #[test]
    fn test_plan_resolves_profile() {
        let (builder, _) = memory_builder(zooms(12, 13));
        let plan = builder.plan("Mauritius_NDVI", &mauritius_source(64, 64)).unwrap();
        assert_eq!(plan.profile, NormalizationProfile::Vegetation);
        assert_eq!(plan.band_index, 0);
        assert!((plan.bounds.west - MAURITIUS.west).abs() < 1e-9);
        assert!((plan.bounds.south - MAURITIUS.south).abs() < 1e-9);
        assert!((plan.bounds.east - MAURITIUS.east).abs() < 1e-9);
        assert!((plan.bounds.north - MAURITIUS.north).abs() < 1e-9);

        let (builder, _) = memory_builder(BuildOptions {
            profile: Some(NormalizationProfile::Soil),
            ..zooms(12, 13)
        });
        let plan = builder.plan("Mauritius_NDVI", &mauritius_source(64, 64)).unwrap();
        assert_eq!(plan.profile, NormalizationProfile::Soil);
    }

    #[test]
    fn test_plan_rejects_bad_configuration() {
        let source = mauritius_source(16, 16);
        let cases = [
            zooms(13, 12),
            zooms(12, 25),
            BuildOptions {
                tile_size: 0,
                ..zooms(0, 1)
            },
            BuildOptions {
                band: 2,
                ..zooms(0, 1)
            },
        ];
        for options in cases {
            let (builder, _) = memory_builder(options);
            assert!(builder.plan("ndvi", &source).is_err());
        }

        let (builder, _) = memory_builder(zooms(0, 1));
        let utm = ArrayRasterSource::from_band(
            Array2::zeros((4, 4)),
            GeoTransform::north_up(500_000.0, 7_800_000.0, 30.0, 30.0),
            Crs::from_epsg(32740),
        );
        assert!(matches!(
            builder.plan("ndvi", &utm),
            Err(ConfigError::UnsupportedCrs(_))
        ));

        let singular = ArrayRasterSource::from_band(
            Array2::zeros((4, 4)),
            GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            Crs::Wgs84,
        );
        assert!(matches!(
            builder.plan("ndvi", &singular),
            Err(ConfigError::SingularTransform)
        ));
    }

    #[test]
    fn test_render_tile_inside_and_outside() {
        let (builder, _) = memory_builder(zooms(12, 12));
        let source = mauritius_source(128, 128);
        let plan = builder.plan("ndvi", &source).unwrap();

        let inside = crate::tiles::geo_to_tile(-20.2, 57.55, 12);
        let bytes = render_tile(&source, &plan, &inside).unwrap().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), TILE_SIZE);

        let outside = crate::tiles::geo_to_tile(10.0, 10.0, 12);
        assert!(render_tile(&source, &plan, &outside).unwrap().is_none());
    }

    #[test]
    fn test_tile_content_is_registered_to_tile_bounds() {
        let (width, height) = (512, 512);
        let dx = MAURITIUS.width() / width as f64;
        let (lat, lon) = (-20.2, 57.55);

        for zoom in [12u8, 14, 16] {
            let tile = crate::tiles::geo_to_tile(lat, lon, zoom);
            // 0 -> 1 step on the source pixel edge nearest the tile centre
            let step = ((tile.bounds().center().0 - MAURITIUS.west) / dx).round() as usize;
            let step_lon = MAURITIUS.west + step as f64 * dx;
            let band = Array2::from_shape_fn((height, width), |(_, c)| {
                if c < step { 0.0 } else { 1.0 }
            });
            let source = ArrayRasterSource::from_band(
                band,
                crate::test_utils::transform_for(&MAURITIUS, width, height),
                Crs::Wgs84,
            );

            let (builder, _) = memory_builder(BuildOptions {
                profile: Some(NormalizationProfile::Moisture),
                ..zooms(zoom, zoom)
            });
            let plan = builder.plan("step", &source).unwrap();
            let bytes = render_tile(&source, &plan, &tile).unwrap().unwrap();
            let image = image::load_from_memory(&bytes).unwrap().into_rgba8();

            let expected = tile.pixel_offset(lat, step_lon, TILE_SIZE).0;
            let observed = (0..TILE_SIZE)
                .find(|&x| image.get_pixel(x, TILE_SIZE / 2)[2] >= 128)
                .unwrap();
            assert!(
                (f64::from(observed) - expected).abs() <= 1.5,
                "zoom {}: step expected at x={:.1}, found at x={}",
                zoom,
                expected,
                observed
            );
        }
    }

    #[tokio::test]
    async fn test_build_layer_counts() {
        let (builder, sink) = memory_builder(zooms(10, 11));
        let report = builder
            .build_layer("ndvi", Arc::new(mauritius_source(64, 64)))
            .await
            .unwrap();
        assert_eq!(report.status, LayerStatus::Completed);
        assert_eq!(report.zooms.len(), 2);
        assert!(report.written > 0);
        assert_eq!(report.failed, 0);
        // tiles plus the manifest
        assert_eq!(sink.len() as u64, report.written + 1);
        assert!(sink.contains("ndvi/metadata.json"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (builder, sink) = memory_builder(zooms(10, 11));
        builder.cancel_token().cancel();
        let report = builder
            .build_layer("ndvi", Arc::new(mauritius_source(64, 64)))
            .await
            .unwrap();
        assert_eq!(report.status, LayerStatus::Cancelled);
        assert_eq!(report.total(), 0);
        assert_eq!(sink.len(), 1);
    }
}
