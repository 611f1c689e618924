//! Local key-value persistence for transcripts and local settings.
//!
//! This module provides:
//! - A namespaced `KvStore` trait
//! - `FileStore`, one JSON file per key under the platform data directory
//! - `MemoryStore`, for wasm builds and tests

use crate::error::{Result, TailorError};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Root used when no data directory override is configured.
pub static DEFAULT_DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::data_local_dir()
        .map(|dir| dir.join("tailor"))
        .unwrap_or_else(|| PathBuf::from("cache"))
});

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Vec<String>;
    fn clear(&self) -> Result<()>;
}

// ============================================
// File-backed store
// ============================================

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `<root>/<namespace>`; the directory is created lazily.
    pub fn new(root: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            dir: root.as_ref().join(sanitize_namespace(namespace)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            TailorError::Storage(format!("Failed to create storage directory: {}", e))
        })?;
        fs::write(self.path_for(key), value)
            .map_err(|e| TailorError::Storage(format!("Failed to write to storage: {}", e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                TailorError::Storage(format!("Failed to delete from storage: {}", e))
            })?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        if !self.dir.exists() {
            return Vec::new();
        }
        fs::read_dir(&self.dir)
            .ok()
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) == Some("json") {
                            path.file_stem()
                                .and_then(|s| s.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .map_err(|e| TailorError::Storage(format!("Failed to clear storage: {}", e)))?;
        }
        Ok(())
    }
}

// ============================================
// In-memory store
// ============================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| TailorError::Storage(e.to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(&sanitize_key(key)).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(sanitize_key(key), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(&sanitize_key(key));
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

fn sanitize_namespace(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Keys become file names, so they are restricted and capped at 64 chars.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}
