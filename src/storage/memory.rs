//! In-memory storage.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::storage::Storage;

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Optional label shown in error messages.
    #[serde(default)]
    pub label: Option<String>,
}

/// Storage that keeps every file in memory.
///
/// Writes replace whole entries under a lock, so they are atomic by
/// construction. Writes can be switched off with [`MemoryStorage::set_read_only`]
/// to exercise failure paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<AHashMap<String, Vec<u8>>>,
    read_only: AtomicBool,
    label: Option<String>,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: RwLock::new(AHashMap::new()),
            read_only: AtomicBool::new(false),
            label: config.label,
        }
    }

    /// Make every subsequent write and delete fail with a permission error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Total bytes held.
    pub fn size_in_bytes(&self) -> usize {
        self.files.read().values().map(|data| data.len()).sum()
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(QuarryError::io(
                format!("write {name} in {}", self.location()),
                io::Error::new(io::ErrorKind::PermissionDenied, "storage is read-only"),
            ));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuarryError::not_found(format!("file {name} in {}", self.location())))
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        self.check_writable(name)?;
        self.files.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_writable(name)?;
        self.files.write().remove(name);
        Ok(())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn location(&self) -> String {
        match &self.label {
            Some(label) => format!("memory:{label}"),
            None => "memory".to_string(),
        }
    }
}
