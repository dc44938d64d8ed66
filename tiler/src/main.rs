use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use raster_pyramid::config::Config;
use raster_pyramid::geometry::Bounds;
use raster_pyramid::pyramid::{
    BuildOptions, CancelToken, FsTileSink, PyramidBuilder, build_directory, layer_key, layer_name,
};
use raster_pyramid::raster::{GeoTiffSource, RasterSource, RasterSummary, inspect};
use raster_pyramid::render::{
    EncodeOptions, NormalizationProfile, OverlayInfo, ResamplingMethod, TileFormat, encode_tile,
    render_overlay,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Slippy-map tile pyramids from georeferenced rasters
///
/// Settings default to the `TILER_*` environment variables; flags override them.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Write Prometheus text metrics here when the run finishes
    #[arg(long, global = true, env = "TILER_METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the tile pyramid of one raster
    Build {
        /// Input GeoTIFF
        raster: PathBuf,

        /// Layer name (defaults to the file stem)
        #[arg(long)]
        layer: Option<String>,

        #[command(flatten)]
        tiling: TilingArgs,
    },

    /// Build a pyramid for every GeoTIFF in a directory
    Batch {
        /// Directory holding *.tif / *.tiff files
        dir: PathBuf,

        #[command(flatten)]
        tiling: TilingArgs,
    },

    /// Render whole rasters into single PNG overlays plus an overlays.json index
    Overlay {
        /// Input GeoTIFFs
        #[arg(required = true)]
        rasters: Vec<PathBuf>,

        /// Output directory (defaults to TILER_OUTPUT_DIR)
        #[arg(long)]
        output: Option<PathBuf>,

        /// One-based band index
        #[arg(long)]
        band: Option<usize>,

        /// Profile for every raster instead of the layer-name lookup
        #[arg(long)]
        profile: Option<NormalizationProfile>,
    },

    /// Print georeferencing and band statistics as JSON
    Inspect {
        /// Input GeoTIFF
        raster: PathBuf,

        /// One-based band index
        #[arg(long, default_value_t = 1)]
        band: usize,

        /// Report whether the raster overlaps "west,south,east,north"
        #[arg(long)]
        region: Option<Bounds>,
    },
}

/// Flags shared by `build` and `batch`
#[derive(Args, Debug)]
struct TilingArgs {
    /// Tile store root
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    min_zoom: Option<u8>,

    #[arg(long)]
    max_zoom: Option<u8>,

    #[arg(long)]
    tile_size: Option<u32>,

    /// One-based band index
    #[arg(long)]
    band: Option<usize>,

    /// png or jpeg
    #[arg(long)]
    format: Option<TileFormat>,

    /// lanczos3 or nearest
    #[arg(long)]
    resampling: Option<ResamplingMethod>,

    /// Force a profile instead of the layer-name lookup
    #[arg(long)]
    profile: Option<NormalizationProfile>,

    /// Maximum tiles in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-tile time limit in seconds
    #[arg(long)]
    tile_timeout_secs: Option<u64>,

    /// Drop the alpha channel from PNG tiles
    #[arg(long)]
    no_alpha: bool,
}

impl TilingArgs {
    /// Apply flags on top of the environment configuration
    fn apply(&self, config: &mut Config) -> Option<NormalizationProfile> {
        if let Some(ref dir) = self.output {
            config.output_dir = dir.clone();
        }
        if let Some(z) = self.min_zoom {
            config.tiles.min_zoom = z;
        }
        if let Some(z) = self.max_zoom {
            config.tiles.max_zoom = z;
        }
        if let Some(size) = self.tile_size {
            config.tiles.tile_size = size;
        }
        if let Some(band) = self.band {
            config.tiles.band = band;
        }
        if let Some(format) = self.format {
            config.tiles.format = format;
        }
        if let Some(method) = self.resampling {
            config.tiles.resampling = method;
        }
        if let Some(n) = self.concurrency {
            config.workers.concurrency = n;
        }
        if let Some(secs) = self.tile_timeout_secs {
            config.workers.tile_timeout = Some(Duration::from_secs(secs));
        }
        if self.no_alpha {
            config.tiles.alpha = false;
        }
        self.profile
    }
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    #[serde(flatten)]
    summary: &'a RasterSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    covers_region: Option<bool>,
}

/// Builder writing into the configured output directory, tripped by Ctrl-C
fn make_builder(config: &Config, profile: Option<NormalizationProfile>) -> PyramidBuilder {
    let options = BuildOptions {
        profile,
        ..config.build_options()
    };
    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight tiles");
            signal_token.cancel();
        }
    });

    let sink = Arc::new(FsTileSink::new(&config.output_dir));
    PyramidBuilder::new(options, sink).with_cancel_token(cancel)
}

async fn open_raster(path: &Path) -> anyhow::Result<GeoTiffSource> {
    let owned = path.to_path_buf();
    let source = tokio::task::spawn_blocking(move || GeoTiffSource::open(&owned))
        .await?
        .with_context(|| format!("Failed to open raster {:?}", path))?;
    Ok(source)
}

async fn run_build(
    config: &Config,
    raster: &Path,
    layer: Option<String>,
    profile: Option<NormalizationProfile>,
) -> anyhow::Result<()> {
    let builder = make_builder(config, profile);
    let source = open_raster(raster).await?;
    let layer = layer.unwrap_or_else(|| layer_name(raster));
    let report = builder.build_layer(&layer, Arc::new(source)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_batch(
    config: &Config,
    dir: &Path,
    profile: Option<NormalizationProfile>,
) -> anyhow::Result<()> {
    let builder = make_builder(config, profile);
    let report = build_directory(&builder, dir)
        .await
        .with_context(|| format!("Failed to scan {:?}", dir))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_overlay(
    config: &Config,
    rasters: &[PathBuf],
    output: &Path,
    band: usize,
    profile: Option<NormalizationProfile>,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {:?}", output))?;

    let mut overlays = Vec::new();
    for path in rasters {
        let name = layer_name(path);
        let layer = layer_key(&name)?;
        let profile = profile.unwrap_or_else(|| config.profile_rules.resolve(&name));

        let source = open_raster(path).await?;
        let bounds = source
            .crs()
            .bounds_to_wgs84(&source.bounds())
            .with_context(|| format!("Unsupported CRS {} in {:?}", source.crs(), path))?;
        let band_index = band
            .checked_sub(1)
            .context("Band indices start at 1")?;

        let png = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let image = render_overlay(&source, band_index, profile)?;
            Ok(encode_tile(&image, &EncodeOptions::default())?)
        })
        .await??;

        let info = OverlayInfo::new(&layer, profile, &bounds);
        std::fs::write(output.join(&info.file), &png)?;
        info!("Wrote overlay {} ({} profile)", info.file, profile);
        overlays.push(info);
    }

    let index = serde_json::to_vec_pretty(&overlays)?;
    std::fs::write(output.join("overlays.json"), index)?;
    println!("{}", serde_json::to_string_pretty(&overlays)?);
    Ok(())
}

async fn run_inspect(raster: &Path, band: usize, region: Option<Bounds>) -> anyhow::Result<()> {
    let source = open_raster(raster).await?;
    let band_index = band.checked_sub(1).context("Band indices start at 1")?;
    let summary = tokio::task::spawn_blocking(move || inspect(&source, band_index)).await??;
    let output = InspectOutput {
        summary: &summary,
        covers_region: region.map(|r| summary.covers(&r)),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install the recorder before any metrics are recorded
    let prometheus = match cli.metrics_file {
        Some(_) => Some(setup_prometheus_metrics()?),
        None => None,
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raster_pyramid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();

    match cli.command {
        Command::Build {
            raster,
            layer,
            tiling,
        } => {
            let profile = tiling.apply(&mut config);
            info!(
                "Building {:?} into {:?}, zoom {}..={}",
                raster, config.output_dir, config.tiles.min_zoom, config.tiles.max_zoom
            );
            run_build(&config, &raster, layer, profile).await?;
        }
        Command::Batch { dir, tiling } => {
            let profile = tiling.apply(&mut config);
            info!("Building every raster in {:?} into {:?}", dir, config.output_dir);
            run_batch(&config, &dir, profile).await?;
        }
        Command::Overlay {
            rasters,
            output,
            band,
            profile,
        } => {
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            let band = band.unwrap_or(config.tiles.band);
            run_overlay(&config, &rasters, &output, band, profile).await?;
        }
        Command::Inspect {
            raster,
            band,
            region,
        } => {
            run_inspect(&raster, band, region).await?;
        }
    }

    if let (Some(handle), Some(path)) = (prometheus, cli.metrics_file.as_ref()) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
        info!("Wrote metrics to {:?}", path);
    }

    Ok(())
}
