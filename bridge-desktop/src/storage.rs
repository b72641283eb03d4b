//! File-backed span storage
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<sha256(key) as hex>/key          the cache key, verbatim
//! <root>/<sha256(key) as hex>/<offset>.span one file per stored range
//! ```

use bridge_traits::{
    error::{BridgeError, Result},
    storage::{SpanStorage, StoredRange},
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const KEY_FILE: &str = "key";
const SPAN_EXTENSION: &str = "span";

/// [`SpanStorage`] keeping each range in its own file.
///
/// Writes land in a temporary file first and are renamed into place, so a
/// crash never leaves a truncated span behind.
#[derive(Debug, Clone)]
pub struct DiskSpanStorage {
    root: PathBuf,
}

impl DiskSpanStorage {
    /// Open (and create if needed) storage rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(Self::map_io_error)?;
        debug!(path = ?root, "Opened span storage");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(hex::encode(digest))
    }

    fn span_path(&self, key: &str, offset: u64) -> PathBuf {
        self.key_dir(key)
            .join(format!("{}.{}", offset, SPAN_EXTENSION))
    }

    fn parse_offset(path: &Path) -> Option<u64> {
        if path.extension()?.to_str()? != SPAN_EXTENSION {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}

impl SpanStorage for DiskSpanStorage {
    fn read(&self, key: &str, offset: u64, length: u64) -> Result<Bytes> {
        let range = self
            .cached_spans(key)?
            .into_iter()
            .find(|range| range.contains(offset))
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!("no span of {} holds offset {}", key, offset))
            })?;

        let mut file =
            fs::File::open(self.span_path(key, range.offset)).map_err(Self::map_io_error)?;
        file.seek(SeekFrom::Start(offset - range.offset))
            .map_err(Self::map_io_error)?;

        let to_read = length.min(range.end() - offset) as usize;
        let mut buf = vec![0u8; to_read];
        file.read_exact(&mut buf).map_err(Self::map_io_error)?;
        Ok(Bytes::from(buf))
    }

    fn write(&self, key: &str, offset: u64, data: &[u8]) -> Result<()> {
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir).map_err(Self::map_io_error)?;

        let key_file = dir.join(KEY_FILE);
        if !key_file.exists() {
            fs::write(&key_file, key.as_bytes()).map_err(Self::map_io_error)?;
        }

        let path = self.span_path(key, offset);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).map_err(Self::map_io_error)?;
        fs::rename(&tmp, &path).map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote span");
        Ok(())
    }

    fn remove_span(&self, key: &str, offset: u64) -> Result<()> {
        match fs::remove_file(self.span_path(key, offset)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Self::map_io_error(e)),
        }

        if self.cached_spans(key)?.is_empty() {
            if let Err(e) = fs::remove_dir_all(self.key_dir(key)) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(key = %key, "Failed to remove empty key directory: {}", e);
                }
            }
        }
        Ok(())
    }

    fn cached_spans(&self, key: &str) -> Result<Vec<StoredRange>> {
        let entries = match fs::read_dir(self.key_dir(key)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io_error(e)),
        };

        let mut ranges = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::map_io_error)?;
            let Some(offset) = Self::parse_offset(&entry.path()) else {
                continue;
            };
            let length = entry.metadata().map_err(Self::map_io_error)?.len();
            ranges.push(StoredRange::new(offset, length));
        }
        ranges.sort_by_key(|range| range.offset);
        Ok(ranges)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(Self::map_io_error)? {
            let entry = entry.map_err(Self::map_io_error)?;
            let key_file = entry.path().join(KEY_FILE);
            match fs::read_to_string(&key_file) {
                Ok(key) => keys.push(key),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?key_file, "Unreadable cache key file: {}", e),
            }
        }
        Ok(keys)
    }

    fn release(&self) -> Result<()> {
        debug!(path = ?self.root, "Span storage released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, DiskSpanStorage) {
        let dir = TempDir::new().unwrap();
        let storage = DiskSpanStorage::new(dir.path().join("media")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_write_and_read_back() {
        let (_dir, storage) = storage();
        storage.write("track-a", 100, b"hello world").unwrap();

        assert_eq!(storage.read("track-a", 100, 5).unwrap(), Bytes::from("hello"));
        assert_eq!(storage.read("track-a", 106, 100).unwrap(), Bytes::from("world"));
        assert!(storage.read("track-a", 0, 5).is_err());
    }

    #[test]
    fn test_cached_spans_are_sorted() {
        let (_dir, storage) = storage();
        storage.write("k", 2_000, &[1; 10]).unwrap();
        storage.write("k", 0, &[2; 20]).unwrap();
        storage.write("other", 0, &[3; 5]).unwrap();

        assert_eq!(
            storage.cached_spans("k").unwrap(),
            vec![StoredRange::new(0, 20), StoredRange::new(2_000, 10)]
        );
        assert!(storage.cached_spans("missing").unwrap().is_empty());
    }

    #[test]
    fn test_keys_survive_reopen() {
        let (dir, storage) = storage();
        storage
            .write("https://cdn.example.com/a.mp3", 0, &[0; 4])
            .unwrap();
        storage.write("b", 0, &[0; 4]).unwrap();

        let reopened = DiskSpanStorage::new(dir.path().join("media")).unwrap();
        let mut keys = reopened.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["b", "https://cdn.example.com/a.mp3"]);
    }

    #[test]
    fn test_remove_last_span_drops_key() {
        let (_dir, storage) = storage();
        storage.write("k", 0, &[0; 4]).unwrap();
        storage.write("k", 4, &[0; 4]).unwrap();

        storage.remove_span("k", 0).unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["k"]);

        storage.remove_span("k", 4).unwrap();
        storage.remove_span("k", 4).unwrap();
        assert!(storage.keys().unwrap().is_empty());
        assert!(!storage.key_dir("k").exists());
    }
}
