//! GeoTIFF raster source
//!
//! Reads georeferencing from the GeoTIFF tags and decodes only the strips or
//! tiles a window touches. A single decoder handle sits behind a mutex; a
//! small LRU of decoded chunks lets neighbouring map tiles share the work.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, info, warn};

use crate::geometry::Crs;

use super::source::{RasterSource, mask_nodata};
use super::types::{GeoTransform, PixelWindow, RasterError};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const GEOKEY_MODEL_TYPE: u32 = 1024;
const GEOKEY_GEOGRAPHIC_TYPE: u32 = 2048;
const GEOKEY_PROJECTED_CS_TYPE: u32 = 3072;

const MODEL_TYPE_GEOGRAPHIC: u32 = 2;

/// Pixels per side the chunk cache should hold: two default tile windows
const CACHE_SPAN: usize = 512;

/// Bounds on the number of decoded chunks kept per open file
const MIN_CHUNK_CACHE: usize = 64;
const MAX_CHUNK_CACHE: usize = 4096;

/// Chunks needed to keep a `CACHE_SPAN` square resident
fn chunk_cache_capacity(chunk_width: usize, chunk_height: usize, chunks_across: usize) -> usize {
    let down = CACHE_SPAN.div_ceil(chunk_height.max(1));
    let across = CACHE_SPAN
        .div_ceil(chunk_width.max(1))
        .min(chunks_across)
        .max(1);
    (down * across).clamp(MIN_CHUNK_CACHE, MAX_CHUNK_CACHE)
}

/// One decoded strip or tile, row stride = `width * samples`
struct DecodedChunk {
    values: Vec<f32>,
    width: usize,
    height: usize,
}

struct ChunkReader {
    decoder: Decoder<BufReader<File>>,
    cache: LruCache<u32, Arc<DecodedChunk>>,
}

impl ChunkReader {
    fn chunk(&mut self, index: u32, samples: usize) -> Result<Arc<DecodedChunk>, RasterError> {
        if let Some(chunk) = self.cache.get(&index) {
            return Ok(chunk.clone());
        }

        let (width, height) = self.decoder.chunk_data_dimensions(index);
        let (width, height) = (width as usize, height as usize);
        let values = decoding_result_to_f32(self.decoder.read_chunk(index)?)?;
        if values.len() < width * height * samples {
            return Err(RasterError::ReadError(format!(
                "chunk {} decoded to {} samples, expected {}",
                index,
                values.len(),
                width * height * samples
            )));
        }

        debug!("Decoded chunk {} ({}x{})", index, width, height);
        let chunk = Arc::new(DecodedChunk {
            values,
            width,
            height,
        });
        self.cache.put(index, chunk.clone());
        Ok(chunk)
    }
}

/// Raster source reading a GeoTIFF file from disk
pub struct GeoTiffSource {
    path: PathBuf,
    width: usize,
    height: usize,
    samples: usize,
    transform: GeoTransform,
    crs: Crs,
    nodata: Option<f64>,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    reader: Mutex<ChunkReader>,
}

impl GeoTiffSource {
    /// Open a GeoTIFF and read its georeferencing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return Err(RasterError::OpenError(format!(
                "{:?} has zero-sized image",
                path
            )));
        }

        let samples = decoder
            .find_tag(Tag::SamplesPerPixel)?
            .map(|v| v.into_u32())
            .transpose()?
            .unwrap_or(1) as usize;
        let planar = decoder
            .find_tag(Tag::PlanarConfiguration)?
            .map(|v| v.into_u32())
            .transpose()?
            .unwrap_or(1);
        if planar == 2 {
            return Err(RasterError::Unsupported(
                "planar (band-sequential) sample layout".to_string(),
            ));
        }

        let transform = read_transform(&mut decoder)?.ok_or_else(|| {
            RasterError::MissingGeoreference(format!(
                "{:?} has neither ModelTransformation nor ModelTiepoint/ModelPixelScale",
                path
            ))
        })?;

        let crs = match read_geokeys(&mut decoder)? {
            Some(keys) => match epsg_from_geokeys(&keys) {
                Some(code) => Crs::from_epsg(code),
                None => {
                    warn!("No EPSG code in GeoKeyDirectory of {:?}, assuming EPSG:4326", path);
                    Crs::Wgs84
                }
            },
            None => {
                warn!("No GeoKeyDirectory in {:?}, assuming EPSG:4326", path);
                Crs::Wgs84
            }
        };

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunk_width = (chunk_width as usize).max(1);
        let chunk_height = (chunk_height as usize).max(1);
        let chunks_across = width.div_ceil(chunk_width);

        let cached = chunk_cache_capacity(chunk_width, chunk_height, chunks_across);

        info!(
            "Opened GeoTIFF {:?}: {}x{} px, {} band(s), {}, chunk {}x{}, caching {} chunks",
            path, width, height, samples, crs, chunk_width, chunk_height, cached
        );

        let capacity = NonZeroUsize::new(cached).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            samples,
            transform,
            crs,
            nodata,
            chunk_width,
            chunk_height,
            chunks_across,
            reader: Mutex::new(ChunkReader {
                decoder,
                cache: LruCache::new(capacity),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GeoTiffSource {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.samples
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn read_window(&self, band: usize, window: PixelWindow) -> Result<Array2<f32>, RasterError> {
        self.check_request(band, &window)?;
        let mut out = Array2::from_elem((window.height, window.width), f32::NAN);
        if window.is_empty() {
            return Ok(out);
        }

        let first_chunk_col = window.col_off / self.chunk_width;
        let last_chunk_col = (window.col_end() - 1) / self.chunk_width;
        let first_chunk_row = window.row_off / self.chunk_height;
        let last_chunk_row = (window.row_end() - 1) / self.chunk_height;

        let mut reader = self
            .reader
            .lock()
            .map_err(|_| RasterError::ReadError("decoder lock poisoned".to_string()))?;

        for chunk_row in first_chunk_row..=last_chunk_row {
            for chunk_col in first_chunk_col..=last_chunk_col {
                let index = (chunk_row * self.chunks_across + chunk_col) as u32;
                let chunk = reader.chunk(index, self.samples)?;

                let chunk_x = chunk_col * self.chunk_width;
                let chunk_y = chunk_row * self.chunk_height;
                let cols = window.col_off.max(chunk_x)..window.col_end().min(chunk_x + chunk.width);
                let rows = window.row_off.max(chunk_y)..window.row_end().min(chunk_y + chunk.height);

                for row in rows {
                    let src_row = (row - chunk_y) * chunk.width;
                    for col in cols.clone() {
                        let offset = (src_row + (col - chunk_x)) * self.samples + band;
                        out[[row - window.row_off, col - window.col_off]] = chunk.values[offset];
                    }
                }
            }
        }
        drop(reader);

        mask_nodata(&mut out, self.nodata);
        Ok(out)
    }
}

fn read_f64_tag(
    decoder: &mut Decoder<BufReader<File>>,
    code: u16,
) -> Result<Option<Vec<f64>>, RasterError> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|v| v.into_f64_vec())
        .transpose()?)
}

fn read_transform(
    decoder: &mut Decoder<BufReader<File>>,
) -> Result<Option<GeoTransform>, RasterError> {
    if let Some(matrix) = read_f64_tag(decoder, TAG_MODEL_TRANSFORMATION)?
        && let Some(transform) = GeoTransform::from_model_transformation(&matrix)
    {
        return Ok(Some(transform));
    }
    let tiepoint = read_f64_tag(decoder, TAG_MODEL_TIEPOINT)?;
    let scale = read_f64_tag(decoder, TAG_MODEL_PIXEL_SCALE)?;
    Ok(match (tiepoint, scale) {
        (Some(tiepoint), Some(scale)) => GeoTransform::from_tiepoint_scale(&tiepoint, &scale),
        _ => None,
    })
}

fn read_geokeys(decoder: &mut Decoder<BufReader<File>>) -> Result<Option<Vec<u32>>, RasterError> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))?
        .map(|v| v.into_u32_vec())
        .transpose()?)
}

/// EPSG code from a GeoKeyDirectory
///
/// The directory is a 4-value header followed by `(key, location, count,
/// value)` entries; only keys stored inline (location 0) are considered.
fn epsg_from_geokeys(keys: &[u32]) -> Option<u32> {
    let entries: Vec<_> = keys
        .get(4..)?
        .chunks_exact(4)
        .filter(|e| e[1] == 0)
        .map(|e| (e[0], e[3]))
        .collect();
    let lookup = |key: u32| entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

    let projected = lookup(GEOKEY_PROJECTED_CS_TYPE);
    let geographic = lookup(GEOKEY_GEOGRAPHIC_TYPE);
    match lookup(GEOKEY_MODEL_TYPE) {
        Some(MODEL_TYPE_GEOGRAPHIC) => geographic.or(projected),
        _ => projected.or(geographic),
    }
}

fn decoding_result_to_f32(result: DecodingResult) -> Result<Vec<f32>, RasterError> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        _ => {
            return Err(RasterError::Unsupported(
                "sample format has no f32 conversion".to_string(),
            ));
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_test_geotiff;

    #[test]
    fn test_epsg_from_geokeys() {
        // header, GTModelType=2, GeographicType=4326
        let keys = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];
        assert_eq!(epsg_from_geokeys(&keys), Some(4326));

        // projected model, ProjectedCSType=3857
        let keys = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 3857];
        assert_eq!(epsg_from_geokeys(&keys), Some(3857));

        // value stored out of line is ignored
        let keys = [1, 1, 0, 1, 3072, 34737, 5, 0];
        assert_eq!(epsg_from_geokeys(&keys), None);
        assert_eq!(epsg_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn test_open_and_read_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.tif");
        write_test_geotiff(&path, 40, 30, Some(-9999.0));

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.width(), 40);
        assert_eq!(source.height(), 30);
        assert_eq!(source.band_count(), 1);
        assert_eq!(source.crs(), Crs::Wgs84);
        assert_eq!(source.nodata(), Some(-9999.0));

        let values = source.read_window(0, PixelWindow::new(5, 7, 10, 12)).unwrap();
        assert_eq!(values.dim(), (12, 10));
        assert_eq!(values[[0, 0]], (7 * 40 + 5) as f32);
        assert_eq!(values[[11, 9]], (18 * 40 + 14) as f32);

        // Pixel (0, 0) holds the no-data sentinel
        let corner = source.read_window(0, PixelWindow::new(0, 0, 2, 1)).unwrap();
        assert!(corner[[0, 0]].is_nan());
        assert_eq!(corner[[0, 1]], 1.0);
    }

    #[test]
    fn test_chunk_cache_capacity() {
        // One-row strips: a 512-row span needs 512 strips
        assert_eq!(chunk_cache_capacity(10_000, 1, 1), 512);
        // Sixteen-row strips
        assert_eq!(chunk_cache_capacity(10_000, 16, 1), 64);
        // 256x256 tiles, many across: 2 x 2 chunks, raised to the floor
        assert_eq!(chunk_cache_capacity(256, 256, 40), MIN_CHUNK_CACHE);
        // 32x32 tiles: 16 x 16 chunks
        assert_eq!(chunk_cache_capacity(32, 32, 100), 256);
        // Degenerate single-pixel chunks are capped
        assert_eq!(chunk_cache_capacity(1, 1, 100_000), MAX_CHUNK_CACHE);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            GeoTiffSource::open("/nonexistent/raster.tif"),
            Err(RasterError::IoError(_))
        ));
    }
}
