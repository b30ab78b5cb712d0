//! Directory-backed storage.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::storage::Storage;

/// Suffix of in-flight atomic writes. Leftovers are garbage from a crash.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the index files. Created if missing.
    pub path: PathBuf,

    /// Whether to fsync files and the directory on every write.
    #[serde(default = "default_sync")]
    pub sync: bool,
}

fn default_sync() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            sync: true,
        }
    }
}

/// Storage in a local directory.
///
/// Writes go to `<name>.tmp`, are synced and read back, then renamed over
/// `<name>` and the directory entry is synced, so a crash at any point
/// leaves either the old file or the new one in place.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    sync: bool,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path).map_err(|e| {
            QuarryError::io(format!("create directory {}", config.path.display()), e)
        })?;
        Ok(FileStorage {
            directory: config.path,
            sync: config.sync,
        })
    }

    /// Open (creating if needed) storage rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(FileStorageConfig::new(path))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn sync_directory(&self) {
        let synced = File::open(&self.directory).and_then(|dir| dir.sync_all());
        if let Err(e) = synced {
            debug!("directory sync of {} skipped: {e}", self.directory.display());
        }
    }
}

/// Read `path` back and check it holds exactly `data`.
fn verify_written(path: &Path, data: &[u8]) -> io::Result<()> {
    let written = fs::read(path)?;
    if written != data {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "read back {} bytes from {} that differ from the {} bytes written",
                written.len(),
                path.display(),
                data.len()
            ),
        ));
    }
    Ok(())
}

impl Storage for FileStorage {
    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                QuarryError::not_found(format!("file {} in {}", name, self.location()))
            } else {
                QuarryError::io(format!("read {}", path.display()), e)
            }
        })
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let target = self.path_of(name);
        let temp = self.path_of(&format!("{name}{TEMP_SUFFIX}"));

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(data)?;
            if self.sync {
                file.sync_all()?;
            }
            drop(file);
            verify_written(&temp, data)?;
            fs::rename(&temp, &target)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(QuarryError::io(format!("write {}", target.display()), e));
        }

        if self.sync {
            self.sync_directory();
        }
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuarryError::io(format!("delete {}", path.display()), e)),
        }
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            QuarryError::io(format!("list {}", self.directory.display()), e)
        })?;

        let mut names = Vec::new();
        for entry in entries {
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

    fn location(&self) -> String {
        self.directory.display().to_string()
    }
}
