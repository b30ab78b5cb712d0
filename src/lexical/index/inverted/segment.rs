//! Immutable on-disk segments.
//!
//! A segment is written once, by a flush of the active segment or by a
//! merge, and is never modified afterwards. Its identity is a numeric id that
//! determines the file names:
//!
//! - `seg_00000007.seg` - the segment file itself
//! - `seg_00000007_3.del` - deletions recorded after the segment was written,
//!   at deletion generation 3

pub mod merge_engine;
pub mod merge_policy;
pub mod reader;
pub mod writer;

use serde::{Deserialize, Serialize};

/// Extension of segment files.
pub const SEGMENT_EXTENSION: &str = "seg";

/// Extension of deletion files.
pub const DELETION_EXTENSION: &str = "del";

/// Metadata about a committed segment, as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment identifier.
    pub segment_id: u64,

    /// Number of documents in the segment file, deleted ones included.
    pub doc_count: u32,

    /// Generation of the deletion file, or 0 when the segment has none.
    #[serde(default)]
    pub deletion_generation: u64,

    /// Number of deleted documents.
    #[serde(default)]
    pub deleted_count: u32,
}

impl SegmentInfo {
    pub fn new(segment_id: u64, doc_count: u32) -> Self {
        SegmentInfo {
            segment_id,
            doc_count,
            deletion_generation: 0,
            deleted_count: 0,
        }
    }

    pub fn live_count(&self) -> u32 {
        self.doc_count.saturating_sub(self.deleted_count)
    }

    pub fn file_name(&self) -> String {
        segment_file_name(self.segment_id)
    }

    /// Name of the current deletion file, if any.
    pub fn deletion_file_name(&self) -> Option<String> {
        (self.deletion_generation > 0).then(|| {
            crate::maintenance::deletion::deletion_file_name(
                self.segment_id,
                self.deletion_generation,
            )
        })
    }
}

/// File name of segment `segment_id`.
pub fn segment_file_name(segment_id: u64) -> String {
    format!("seg_{segment_id:08}.{SEGMENT_EXTENSION}")
}

/// Display name used in logs and errors.
pub fn segment_name(segment_id: u64) -> String {
    format!("seg_{segment_id:08}")
}

/// Kind of file in an index directory, recognized by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFile {
    Segment { segment_id: u64 },
    Deletion { segment_id: u64, generation: u64 },
}

/// Recognize a segment or deletion file name.
pub fn parse_file_name(name: &str) -> Option<IndexFile> {
    let rest = name.strip_prefix("seg_")?;
    let (stem, extension) = rest.rsplit_once('.')?;
    match extension {
        SEGMENT_EXTENSION => Some(IndexFile::Segment {
            segment_id: stem.parse().ok()?,
        }),
        DELETION_EXTENSION => {
            let (id, generation) = stem.split_once('_')?;
            Some(IndexFile::Deletion {
                segment_id: id.parse().ok()?,
                generation: generation.parse().ok()?,
            })
        }
        _ => None,
    }
}
