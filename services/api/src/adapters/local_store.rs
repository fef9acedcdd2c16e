//! services/api/src/adapters/local_store.rs
//!
//! A `LocalStore` backed by a single JSON document on disk. Every `set`
//! rewrites the file through a temporary sibling and a rename, so a crash
//! mid-write leaves the previous document intact.

use raven_core::ports::{LocalStore, PortError, PortResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct FileLocalStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileLocalStore {
    /// Opens the document at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> PortResult<Self> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|e| {
                PortError::Unexpected(format!("Local store {} is corrupt: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(PortError::Unexpected(format!(
                    "Failed to read local store {}: {e}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), keys = values.len(), "Opened local store");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, values: &Map<String, Value>) -> PortResult<()> {
        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode local store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(&tmp, bytes).map_err(io_error)?;
        std::fs::rename(&tmp, &self.path).map_err(io_error)?;
        Ok(())
    }
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("Local store write failed: {e}"))
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> PortResult<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| PortError::Unexpected("local store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> PortResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| PortError::Unexpected("local store lock poisoned".to_string()))?;
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.write_document(&next)?;
        *values = next;
        Ok(())
    }
}
