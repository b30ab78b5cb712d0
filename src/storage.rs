//! Storage abstraction for index files.
//!
//! Every component that touches files goes through [`Storage`]. Files are
//! small enough to be read whole, and every write is atomic: a reader sees
//! either the previous content or the complete new content, never a prefix.
//!
//! - [`file::FileStorage`] keeps files in a directory on disk.
//! - [`memory::MemoryStorage`] keeps files in a map, for tests and ephemeral indexes.

pub mod file;
pub mod memory;
pub mod structured;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use self::file::{FileStorage, FileStorageConfig};
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// A flat namespace of named, atomically replaced files.
pub trait Storage: Send + Sync + Debug {
    /// Read the whole file. Fails with `NotFound` if it does not exist.
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Replace (or create) the file with `data`, atomically.
    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Remove the file. Removing a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Check whether the file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// List the names of all files.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Human-readable location, used in error messages and logs.
    fn location(&self) -> String;
}

/// Configuration selecting a storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    File(FileStorageConfig),
    Memory(MemoryStorageConfig),
}

/// Creates storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
        }
    }
}
