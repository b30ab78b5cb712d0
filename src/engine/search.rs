//! Search results and index statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lexical::core::document::StoredDocument;

pub use crate::lexical::search::evaluator::CancellationToken;

/// Address of a document: its segment and its id within the segment.
///
/// Addresses order by segment, then document. They stay valid until a merge
/// removes the segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DocAddress {
    pub segment: u64,
    pub doc: u32,
}

impl DocAddress {
    pub fn new(segment: u64, doc: u32) -> Self {
        DocAddress { segment, doc }
    }
}

impl fmt::Display for DocAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg_{:08}#{}", self.segment, self.doc)
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub address: DocAddress,
    pub score: f32,
    /// Stored fields of the document.
    pub document: StoredDocument,
}

/// Counters describing an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Manifest generation of the published snapshot.
    pub generation: u64,
    /// Committed segment ids, oldest first.
    pub segment_ids: Vec<u64>,
    /// Committed documents, deleted ones included.
    pub doc_count: u64,
    /// Committed, visible documents.
    pub live_docs: u64,
    /// Committed documents tombstoned but not yet merged away.
    pub deleted_docs: u64,
    /// Documents added but not yet committed.
    pub pending_docs: u64,
    /// Segments skipped at open because they failed validation.
    pub corrupt_segments: Vec<u64>,
}

impl IndexStats {
    pub fn segment_count(&self) -> usize {
        self.segment_ids.len()
    }
}
