//! Tile stores
//!
//! Keys are `/`-separated relative paths such as `ndvi/12/2702/2282.png`.
//! `put` runs on blocking worker threads and may be called concurrently,
//! including for keys that share parent directories.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::render::TileFormat;
use crate::tiles::TileCoordinate;

use super::types::SinkError;

/// Destination for encoded tiles and layer metadata
pub trait TileSink: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError>;
}

/// `{layer}/{z}/{x}/{y}.{ext}`
pub fn tile_key(layer: &str, tile: &TileCoordinate, format: TileFormat) -> String {
    format!(
        "{}/{}/{}/{}.{}",
        layer,
        tile.zoom,
        tile.x,
        tile.y,
        format.extension()
    )
}

/// Tile store rooted at a directory
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written tile.
#[derive(Debug)]
pub struct FsTileSink {
    root: PathBuf,
    counter: AtomicU64,
}

impl FsTileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a key; rejects absolute and parent components
    pub fn path_for(&self, key: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return Err(SinkError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl TileSink for FsTileSink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let path = self.path_for(key)?;
        let write_err = |source| SinkError::WriteError {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            // Succeeds when another worker created it first
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SinkError::InvalidKey(key.to_string()))?;
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

        fs::write(&tmp, bytes).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }

        debug!("Wrote {} ({} bytes)", key, bytes.len());
        Ok(())
    }
}

/// In-memory tile store
#[derive(Debug, Default)]
pub struct MemoryTileSink {
    tiles: DashMap<String, Bytes>,
}

impl MemoryTileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.tiles.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.tiles.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl TileSink for MemoryTileSink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError> {
        self.tiles
            .insert(key.to_string(), Bytes::copy_from_slice(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tile_key() {
        let key = tile_key("ndvi", &TileCoordinate::new(12, 2702, 2282), TileFormat::Png);
        assert_eq!(key, "ndvi/12/2702/2282.png");
        let key = tile_key("ndvi", &TileCoordinate::new(3, 1, 2), TileFormat::Jpeg);
        assert_eq!(key, "ndvi/3/1/2.jpg");
    }

    #[test]
    fn test_fs_sink_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsTileSink::new(dir.path());
        sink.put("layer/1/0/0.png", b"first").unwrap();
        sink.put("layer/1/0/0.png", b"second").unwrap();
        let stored = fs::read(dir.path().join("layer/1/0/0.png")).unwrap();
        assert_eq!(stored, b"second");

        // No temporary files left behind
        let names: Vec<_> = fs::read_dir(dir.path().join("layer/1/0"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_fs_sink_rejects_escaping_keys() {
        let sink = FsTileSink::new("/tmp/tiles");
        assert!(matches!(sink.path_for("../x.png"), Err(SinkError::InvalidKey(_))));
        assert!(matches!(sink.path_for("/etc/x.png"), Err(SinkError::InvalidKey(_))));
        assert!(matches!(sink.path_for(""), Err(SinkError::InvalidKey(_))));
        assert!(sink.path_for("a/b.png").is_ok());
    }

    #[test]
    fn test_fs_sink_concurrent_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FsTileSink::new(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || sink.put(&format!("l/5/3/{}.png", i), b"x"))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(fs::read_dir(dir.path().join("l/5/3")).unwrap().count(), 8);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryTileSink::new();
        sink.put("b", b"2").unwrap();
        sink.put("a", b"1").unwrap();
        assert_eq!(sink.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.get("a").unwrap().as_ref(), b"1");
        assert!(sink.contains("b"));
        assert_eq!(sink.len(), 2);
    }
}
