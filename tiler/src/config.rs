//! Tiler configuration
//!
//! Configuration is loaded from `TILER_*` environment variables; command-line
//! flags override individual values afterwards.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::pyramid::BuildOptions;
use crate::render::{EncodeOptions, ProfileRules, ResamplingMethod, TILE_SIZE, TileFormat};

/// Main tiler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the tile store
    pub output_dir: PathBuf,

    /// Tile generation settings
    pub tiles: TileConfig,

    /// Worker pool settings
    pub workers: WorkerConfig,

    /// Layer-name to profile lookup, overrides first
    pub profile_rules: ProfileRules,
}

/// What each tile looks like
#[derive(Debug, Clone)]
pub struct TileConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Tile edge in pixels
    pub tile_size: u32,
    /// One-based band index
    pub band: usize,
    pub format: TileFormat,
    pub jpeg_quality: u8,
    /// Keep transparency for no-data (PNG only)
    pub alpha: bool,
    pub resampling: ResamplingMethod,
}

/// How tiles are scheduled
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum tiles in flight
    pub concurrency: usize,
    /// Per-tile time limit
    pub tile_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("tiles"),
            tiles: TileConfig::default(),
            workers: WorkerConfig::default(),
            profile_rules: ProfileRules::builtin(),
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            min_zoom: 12,
            max_zoom: 16,
            tile_size: TILE_SIZE,
            band: 1,
            format: TileFormat::Png,
            jpeg_quality: 85,
            alpha: true,
            resampling: ResamplingMethod::Lanczos3,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            tile_timeout: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("TILER_OUTPUT_DIR")
            && !dir.is_empty()
        {
            config.output_dir = PathBuf::from(dir);
        }

        // Tile config
        if let Some(val) = lookup("TILER_MIN_ZOOM")
            && let Ok(z) = val.parse()
        {
            config.tiles.min_zoom = z;
        }
        if let Some(val) = lookup("TILER_MAX_ZOOM")
            && let Ok(z) = val.parse()
        {
            config.tiles.max_zoom = z;
        }
        if let Some(val) = lookup("TILER_TILE_SIZE")
            && let Ok(size) = val.parse()
        {
            config.tiles.tile_size = size;
        }
        if let Some(val) = lookup("TILER_BAND")
            && let Ok(band) = val.parse()
        {
            config.tiles.band = band;
        }
        if let Some(val) = lookup("TILER_FORMAT")
            && let Ok(format) = val.parse()
        {
            config.tiles.format = format;
        }
        if let Some(val) = lookup("TILER_JPEG_QUALITY")
            && let Ok(q) = val.parse::<u8>()
        {
            config.tiles.jpeg_quality = q.clamp(1, 100);
        }
        if let Some(val) = lookup("TILER_ALPHA") {
            config.tiles.alpha = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("TILER_RESAMPLING")
            && let Ok(method) = val.parse()
        {
            config.tiles.resampling = method;
        }

        // Worker config
        if let Some(val) = lookup("TILER_CONCURRENCY")
            && let Ok(n) = val.parse::<usize>()
            && n > 0
        {
            config.workers.concurrency = n;
        }
        if let Some(val) = lookup("TILER_TILE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.workers.tile_timeout = Some(Duration::from_secs(secs));
        }

        // Profile rules
        if let Some(val) = lookup("TILER_PROFILE_RULES") {
            match val.parse::<ProfileRules>() {
                Ok(overrides) => {
                    config.profile_rules = ProfileRules::builtin().with_overrides(overrides);
                }
                Err(e) => warn!("Ignoring TILER_PROFILE_RULES: {}", e),
            }
        }

        config
    }

    /// Builder options for this configuration
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            min_zoom: self.tiles.min_zoom,
            max_zoom: self.tiles.max_zoom,
            tile_size: self.tiles.tile_size,
            band: self.tiles.band,
            concurrency: self.workers.concurrency,
            encode: EncodeOptions {
                format: self.tiles.format,
                jpeg_quality: self.tiles.jpeg_quality,
                alpha: self.tiles.alpha,
            },
            resampling: self.tiles.resampling,
            tile_timeout: self.workers.tile_timeout,
            profile: None,
            profile_rules: self.profile_rules.clone(),
            write_manifest: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NormalizationProfile;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("tiles"));
        assert_eq!(config.tiles.min_zoom, 12);
        assert_eq!(config.tiles.max_zoom, 16);
        assert_eq!(config.tiles.tile_size, 256);
        assert_eq!(config.tiles.band, 1);
        assert!(config.tiles.alpha);
        assert!(config.workers.tile_timeout.is_none());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("TILER_OUTPUT_DIR", "/srv/tiles"),
            ("TILER_MIN_ZOOM", "8"),
            ("TILER_MAX_ZOOM", "10"),
            ("TILER_FORMAT", "jpeg"),
            ("TILER_ALPHA", "false"),
            ("TILER_CONCURRENCY", "3"),
            ("TILER_TILE_TIMEOUT_SECS", "5"),
            ("TILER_RESAMPLING", "nearest"),
            ("TILER_PROFILE_RULES", "dem=soil"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/srv/tiles"));
        assert_eq!((config.tiles.min_zoom, config.tiles.max_zoom), (8, 10));
        assert_eq!(config.tiles.format, TileFormat::Jpeg);
        assert!(!config.tiles.alpha);
        assert_eq!(config.workers.concurrency, 3);
        assert_eq!(config.workers.tile_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.tiles.resampling, ResamplingMethod::Nearest);
        assert_eq!(config.profile_rules.resolve("dem_ndvi"), NormalizationProfile::Soil);
        assert_eq!(config.profile_rules.resolve("ndvi"), NormalizationProfile::Vegetation);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("TILER_MIN_ZOOM", "twelve"),
            ("TILER_CONCURRENCY", "0"),
            ("TILER_PROFILE_RULES", "nonsense"),
        ]));
        assert_eq!(config.tiles.min_zoom, 12);
        assert!(config.workers.concurrency > 0);
        assert_eq!(config.profile_rules, ProfileRules::builtin());
    }

    #[test]
    fn test_build_options() {
        let options = Config::default().build_options();
        assert_eq!(options.band, 1);
        assert_eq!(options.encode.format, TileFormat::Png);
        assert!(options.profile.is_none());
    }
}
