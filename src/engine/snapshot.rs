//! Published index state.
//!
//! An [`IndexSnapshot`] is the immutable set of committed segments queries
//! run against. Commits and merges build a new snapshot and swap it in;
//! a query keeps the snapshot it loaded at its start.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::Result;
use crate::lexical::core::posting::PostingList;
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::segment::SegmentInfo;
use crate::lexical::index::inverted::segment::reader::SegmentReader;
use crate::lexical::search::evaluator::SegmentSource;
use crate::maintenance::deletion::DeletionBitmap;

/// A segment together with the deletions that apply to it.
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub info: SegmentInfo,
    pub reader: Arc<SegmentReader>,

    /// Every tombstone: those written with the segment plus later deletions.
    pub deletions: Arc<DeletionBitmap>,
}

impl SegmentView {
    pub fn new(info: SegmentInfo, reader: Arc<SegmentReader>, deletions: DeletionBitmap) -> Self {
        SegmentView {
            info,
            reader,
            deletions: Arc::new(deletions),
        }
    }

    /// Same segment, other deletions.
    pub fn with_deletions(&self, info: SegmentInfo, deletions: DeletionBitmap) -> Self {
        SegmentView::new(info, self.reader.clone(), deletions)
    }

    pub fn segment_id(&self) -> u64 {
        self.info.segment_id
    }

    pub fn live_count(&self) -> u32 {
        self.deletions.live_count()
    }
}

impl SegmentSource for SegmentView {
    fn segment_id(&self) -> u64 {
        self.info.segment_id
    }

    fn doc_count(&self) -> u32 {
        self.reader.doc_count()
    }

    fn is_deleted(&self, doc_id: u32) -> bool {
        self.deletions.is_deleted(doc_id)
    }

    fn postings(&self, term: &Term) -> Result<Cow<'_, PostingList>> {
        self.reader.lookup(term).map(Cow::Owned)
    }

    fn doc_frequency(&self, term: &Term) -> Result<u32> {
        Ok(self.reader.doc_frequency(term))
    }

    fn field_length(&self, field: &str, doc_id: u32) -> u32 {
        self.reader.field_length(field, doc_id)
    }

    fn total_field_length(&self, field: &str) -> u64 {
        self.reader.total_field_length(field)
    }
}

/// The committed segments of one manifest generation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub segments: Vec<Arc<SegmentView>>,
}

impl IndexSnapshot {
    pub fn new(generation: u64, segments: Vec<Arc<SegmentView>>) -> Self {
        IndexSnapshot {
            generation,
            segments,
        }
    }

    pub fn segment(&self, segment_id: u64) -> Option<&Arc<SegmentView>> {
        self.segments.iter().find(|s| s.segment_id() == segment_id)
    }

    pub fn sources(&self) -> Vec<&dyn SegmentSource> {
        self.segments
            .iter()
            .map(|s| s.as_ref() as &dyn SegmentSource)
            .collect()
    }

    pub fn live_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }
}
