//! The index manifest: the committed list of segments.
//!
//! `manifest.json` is the single source of truth of what an index contains.
//! It is replaced atomically on every commit and merge; segment and deletion
//! files it does not reference are garbage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::lexical::index::inverted::segment::SegmentInfo;
use crate::storage::Storage;

/// File name of the manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Committed state of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version.
    pub version: u32,

    /// Incremented by every commit and merge.
    pub generation: u64,

    /// Smallest segment id never used.
    pub next_segment_id: u64,

    /// When this generation was written.
    pub committed_at: DateTime<Utc>,

    /// Committed segments, oldest first.
    #[serde(default)]
    pub segments: Vec<SegmentInfo>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            generation: 0,
            next_segment_id: 0,
            committed_at: Utc::now(),
            segments: Vec::new(),
        }
    }
}

impl Manifest {
    /// Read the manifest. Returns `None` for a fresh index.
    pub fn load(storage: &dyn Storage) -> Result<Option<Manifest>> {
        if !storage.file_exists(MANIFEST_FILE) {
            return Ok(None);
        }
        let data = storage.read_file(MANIFEST_FILE)?;
        let manifest: Manifest = serde_json::from_slice(&data)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(QuarryError::index(format!(
                "unsupported manifest version {} in {}",
                manifest.version,
                storage.location()
            )));
        }
        Ok(Some(manifest))
    }

    /// Write the manifest atomically.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        storage.write_atomic(MANIFEST_FILE, &data)
    }

    /// The manifest of the next generation, listing `segments`.
    pub fn next(&self, segments: Vec<SegmentInfo>, next_segment_id: u64) -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            generation: self.generation + 1,
            next_segment_id: next_segment_id.max(self.next_segment_id),
            committed_at: Utc::now(),
            segments,
        }
    }

    pub fn segment(&self, segment_id: u64) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.segment_id == segment_id)
    }

    /// Names of the segment and deletion files this manifest references.
    pub fn referenced_files(&self) -> HashSet<String> {
        let mut files = HashSet::new();
        for info in &self.segments {
            files.insert(info.file_name());
            if let Some(del) = info.deletion_file_name() {
                files.insert(del);
            }
        }
        files
    }

    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    pub fn live_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }
}
