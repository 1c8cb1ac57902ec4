//! Log Storage Abstraction
//!
//! Two flat areas of named blobs: the buffer (staging, not yet sampled) and
//! the drain pool (sampling-eligible). A log lives in at most one area.
//!
//! ## Implementations
//!
//! - `LocalLogStore`: two sibling directories on disk (production)
//! - `InMemoryLogStore`: for unit tests and DST, with fault injection

use crate::error::StoreError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Logs keyed by filename. A batch never carries the same name twice.
pub type LogBatch = BTreeMap<String, Bytes>;

/// Which of the two areas a log lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Buffer,
    Drain,
}

/// Trait for log storage backends.
///
/// Callers serialize access through the directory lock; implementations
/// need not make multi-step sequences atomic.
pub trait LogStore: Send + Sync + 'static {
    /// Write a log into the buffer, replacing any same-named buffered log.
    fn write_buffered(&self, name: &str, content: &[u8]) -> Result<(), StoreError>;
    /// List log names in an area, sorted.
    fn list(&self, area: Area) -> Result<Vec<String>, StoreError>;
    /// Read a log's bytes.
    fn read(&self, area: Area, name: &str) -> Result<Bytes, StoreError>;
    /// Move a log from the buffer into the drain pool, replacing any
    /// same-named drained log.
    fn promote(&self, name: &str) -> Result<(), StoreError>;
    /// Delete a log from the drain pool.
    fn evict(&self, name: &str) -> Result<(), StoreError>;
    /// Where consumers find the drain pool.
    fn drain_location(&self) -> String;
}

/// Reject names that would not stay inside a flat directory
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ============================================================================
// LocalLogStore - For production
// ============================================================================

/// Buffer and drain directories on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalLogStore {
    buffer_dir: PathBuf,
    drain_dir: PathBuf,
}

impl LocalLogStore {
    /// Open both directories, creating them if missing. Existing contents
    /// are kept.
    pub fn open(buffer_dir: &Path, drain_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(buffer_dir)?;
        std::fs::create_dir_all(drain_dir)?;
        Ok(LocalLogStore {
            buffer_dir: std::fs::canonicalize(buffer_dir)?,
            drain_dir: std::fs::canonicalize(drain_dir)?,
        })
    }

    /// Discard anything already in either directory and start both empty.
    pub fn recreate(buffer_dir: &Path, drain_dir: &Path) -> Result<Self, StoreError> {
        for dir in [buffer_dir, drain_dir] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::open(buffer_dir, drain_dir)
    }

    pub fn buffer_dir(&self) -> &Path {
        &self.buffer_dir
    }

    pub fn drain_dir(&self) -> &Path {
        &self.drain_dir
    }

    fn dir(&self, area: Area) -> &Path {
        match area {
            Area::Buffer => &self.buffer_dir,
            Area::Drain => &self.drain_dir,
        }
    }

    fn file_path(&self, area: Area, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.dir(area).join(name))
    }
}

impl LogStore for LocalLogStore {
    fn write_buffered(&self, name: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.file_path(Area::Buffer, name)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn list(&self, area: Area) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.dir(area))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, area: Area, name: &str) -> Result<Bytes, StoreError> {
        let path = self.file_path(area, name)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn promote(&self, name: &str) -> Result<(), StoreError> {
        let src = self.file_path(Area::Buffer, name)?;
        let dst = self.file_path(Area::Drain, name)?;
        match std::fs::rename(&src, &dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            // Different filesystems: fall back to copy + remove
            Err(rename_err) => {
                std::fs::copy(&src, &dst).map_err(|_| rename_err)?;
                std::fs::remove_file(&src)?;
                Ok(())
            }
        }
    }

    fn evict(&self, name: &str) -> Result<(), StoreError> {
        let path = self.file_path(Area::Drain, name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn drain_location(&self) -> String {
        self.drain_dir.display().to_string()
    }
}

// ============================================================================
// InMemoryLogStore - For unit tests and DST
// ============================================================================

/// Store operation an injected fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    Write,
    Promote,
    Evict,
}

#[derive(Debug, Clone, Copy)]
struct ArmedFault {
    fault: StoreFault,
    /// Operations of this kind still allowed to succeed
    remaining: usize,
}

#[derive(Debug, Default)]
struct Areas {
    buffer: BTreeMap<String, Bytes>,
    drain: BTreeMap<String, Bytes>,
    fault: Option<ArmedFault>,
}

impl Areas {
    fn area(&self, area: Area) -> &BTreeMap<String, Bytes> {
        match area {
            Area::Buffer => &self.buffer,
            Area::Drain => &self.drain,
        }
    }

    /// Fails once the armed fault's allowance is used up, and keeps failing
    /// until cleared (like a full disk).
    fn check_fault(&mut self, op: StoreFault, name: &str) -> Result<(), StoreError> {
        match &mut self.fault {
            Some(armed) if armed.fault == op => {
                if armed.remaining == 0 {
                    return Err(StoreError::Io(io::Error::other(format!(
                        "injected {:?} fault on {}",
                        op, name
                    ))));
                }
                armed.remaining -= 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// In-memory log store for unit tests and deterministic simulation
#[derive(Debug, Clone)]
pub struct InMemoryLogStore {
    areas: Arc<Mutex<Areas>>,
    location: String,
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        InMemoryLogStore {
            areas: Arc::new(Mutex::new(Areas::default())),
            location: "memory://drain".to_string(),
        }
    }

    /// Let `after` operations of kind `fault` succeed, then fail every
    /// further one until `clear_fault`. Replaces any armed fault.
    pub fn inject_fault(&self, fault: StoreFault, after: usize) {
        self.areas.lock().fault = Some(ArmedFault {
            fault,
            remaining: after,
        });
    }

    pub fn clear_fault(&self) {
        self.areas.lock().fault = None;
    }

    /// Put a log straight into the drain pool (test setup)
    pub fn seed_drained(&self, name: &str, content: &[u8]) {
        self.areas
            .lock()
            .drain
            .insert(name.to_string(), Bytes::copy_from_slice(content));
    }

    pub fn count(&self, area: Area) -> usize {
        self.areas.lock().area(area).len()
    }
}

impl LogStore for InMemoryLogStore {
    fn write_buffered(&self, name: &str, content: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut areas = self.areas.lock();
        areas.check_fault(StoreFault::Write, name)?;
        areas
            .buffer
            .insert(name.to_string(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn list(&self, area: Area) -> Result<Vec<String>, StoreError> {
        // BTreeMap keys are already sorted
        Ok(self.areas.lock().area(area).keys().cloned().collect())
    }

    fn read(&self, area: Area, name: &str) -> Result<Bytes, StoreError> {
        self.areas
            .lock()
            .area(area)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn promote(&self, name: &str) -> Result<(), StoreError> {
        let mut areas = self.areas.lock();
        areas.check_fault(StoreFault::Promote, name)?;
        let content = areas
            .buffer
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        areas.drain.insert(name.to_string(), content);
        Ok(())
    }

    fn evict(&self, name: &str) -> Result<(), StoreError> {
        let mut areas = self.areas.lock();
        areas.check_fault(StoreFault::Evict, name)?;
        areas
            .drain
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn drain_location(&self) -> String {
        self.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("2024-01-01_abc.json.gz").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn test_in_memory_promote_and_evict() {
        let store = InMemoryLogStore::new();
        store.write_buffered("a", b"1").unwrap();
        store.write_buffered("b", b"2").unwrap();
        assert_eq!(store.list(Area::Buffer).unwrap(), vec!["a", "b"]);

        store.promote("a").unwrap();
        assert_eq!(store.list(Area::Buffer).unwrap(), vec!["b"]);
        assert_eq!(store.read(Area::Drain, "a").unwrap(), Bytes::from_static(b"1"));

        store.evict("a").unwrap();
        assert_eq!(store.count(Area::Drain), 0);
        assert!(matches!(store.evict("a"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_in_memory_promote_overwrites() {
        let store = InMemoryLogStore::new();
        store.seed_drained("x", b"old");
        store.write_buffered("x", b"new").unwrap();
        store.promote("x").unwrap();
        assert_eq!(store.count(Area::Drain), 1);
        assert_eq!(store.read(Area::Drain, "x").unwrap(), Bytes::from_static(b"new"));
    }

    #[test]
    fn test_injected_fault_is_sticky_until_cleared() {
        let store = InMemoryLogStore::new();
        store.inject_fault(StoreFault::Write, 1);
        store.write_buffered("a", b"1").unwrap();
        assert!(matches!(store.write_buffered("b", b"2"), Err(StoreError::Io(_))));
        assert!(matches!(store.write_buffered("c", b"3"), Err(StoreError::Io(_))));
        assert_eq!(store.list(Area::Buffer).unwrap(), vec!["a"]);

        // Other operations are unaffected
        store.promote("a").unwrap();

        store.clear_fault();
        store.write_buffered("b", b"2").unwrap();
        assert_eq!(store.count(Area::Buffer), 1);
    }

    #[test]
    fn test_local_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            LocalLogStore::open(&tmp.path().join("buffer"), &tmp.path().join("drain")).unwrap();

        store.write_buffered("log1", b"hello").unwrap();
        store.write_buffered("log1", b"hello again").unwrap();
        store.write_buffered("log2", b"world").unwrap();
        assert_eq!(store.list(Area::Buffer).unwrap(), vec!["log1", "log2"]);

        store.promote("log1").unwrap();
        assert_eq!(store.list(Area::Buffer).unwrap(), vec!["log2"]);
        assert_eq!(store.list(Area::Drain).unwrap(), vec!["log1"]);
        assert_eq!(
            store.read(Area::Drain, "log1").unwrap(),
            Bytes::from_static(b"hello again")
        );

        store.evict("log1").unwrap();
        assert!(store.list(Area::Drain).unwrap().is_empty());
        assert!(matches!(store.evict("log1"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.promote("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_local_store_rejects_escaping_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            LocalLogStore::open(&tmp.path().join("buffer"), &tmp.path().join("drain")).unwrap();
        assert!(matches!(
            store.write_buffered("../drain/sneaky", b"x"),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_recreate_discards_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let buffer = tmp.path().join("buffer");
        let drain = tmp.path().join("drain");

        let store = LocalLogStore::open(&buffer, &drain).unwrap();
        store.write_buffered("stale", b"x").unwrap();
        store.promote("stale").unwrap();
        store.write_buffered("stale2", b"y").unwrap();

        let store = LocalLogStore::recreate(&buffer, &drain).unwrap();
        assert!(store.list(Area::Buffer).unwrap().is_empty());
        assert!(store.list(Area::Drain).unwrap().is_empty());
        assert!(store.drain_dir().is_absolute());
        assert_eq!(store.drain_location(), store.drain_dir().display().to_string());
    }
}
