//! Whole-document stores: JSON files on disk, or an in-memory map.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::error::CheckpointError;

/// Durable key-value persistence keyed by a caller-supplied path.
///
/// Read-modify-write granularity is the whole document: `write_document`
/// replaces whatever was stored at `path`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns None if nothing has been stored at `path` yet.
    async fn read_document(&self, path: &Path) -> Result<Option<Value>, CheckpointError>;

    async fn write_document(&self, path: &Path, document: &Value) -> Result<(), CheckpointError>;
}

/// JSON files on disk. Writes go to a temp file in the target directory and are
/// renamed over the old document, so a crash never leaves a half-written file.
/// Reads and writes to the same path are serialised.
#[derive(Debug, Default)]
pub struct JsonFileStore {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn read_document(&self, path: &Path) -> Result<Option<Value>, CheckpointError> {
        let lock = self.path_lock(path);
        let _held = lock.lock().await;

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::io(path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write_document(&self, path: &Path, document: &Value) -> Result<(), CheckpointError> {
        let lock = self.path_lock(path);
        let _held = lock.lock().await;

        let json = serde_json::to_vec_pretty(document)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &json))
            .await
            .map_err(|e| CheckpointError::io(path, io::Error::new(io::ErrorKind::Other, e)))?
            .map_err(|e| CheckpointError::io(path, e))?;
        tracing::trace!(path = %path.display(), "checkpoint written");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-process store. Useful for embedding and for tests that need to observe
/// every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<PathBuf, Value>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document, e.g. a legacy-shaped one.
    pub fn insert(&self, path: impl Into<PathBuf>, document: Value) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), document);
    }

    pub fn document(&self, path: &Path) -> Option<Value> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Number of `write_document` calls so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_document(&self, path: &Path) -> Result<Option<Value>, CheckpointError> {
        Ok(self.document(path))
    }

    async fn write_document(&self, path: &Path, document: &Value) -> Result<(), CheckpointError> {
        self.insert(path, document.clone());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
