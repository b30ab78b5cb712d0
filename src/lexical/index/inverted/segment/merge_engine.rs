//! Merge engine: combines segments into one, dropping deleted documents.
//!
//! Live documents are renumbered contiguously in source order (first source
//! first, ascending ids within a source), so every merged posting list stays
//! sorted. The per-source [`DocMap`] records where each old document went,
//! which lets deletions that arrive while the merge runs be carried over to
//! the merged segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::error::Result;
use crate::lexical::core::document::StoredDocument;
use crate::lexical::core::posting::{Posting, PostingList};
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::segment::SegmentInfo;
use crate::lexical::index::inverted::segment::reader::SegmentReader;
use crate::lexical::index::inverted::segment::writer::{SegmentContent, write_segment_content};
use crate::maintenance::deletion::DeletionBitmap;
use crate::storage::Storage;

/// One input of a merge: a segment and the deletions to apply to it.
#[derive(Debug, Clone)]
pub struct MergeSource {
    pub reader: Arc<SegmentReader>,
    pub deletions: Arc<DeletionBitmap>,
}

/// Old document id to new document id, for one source segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMap {
    pub segment_id: u64,
    mapping: Vec<Option<u32>>,
}

impl DocMap {
    /// New id of `old_doc`, or `None` if it was dropped.
    pub fn get(&self, old_doc: u32) -> Option<u32> {
        self.mapping.get(old_doc as usize).copied().flatten()
    }
}

/// The result of merging, ready to be written.
#[derive(Debug)]
pub struct MergedSegment {
    terms: BTreeMap<Term, PostingList>,
    stored: Vec<StoredDocument>,
    norms: Vec<(String, Vec<u32>)>,
    doc_maps: Vec<DocMap>,
}

impl MergedSegment {
    pub fn doc_count(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn doc_maps(&self) -> &[DocMap] {
        &self.doc_maps
    }

    /// Document map of source `segment_id`.
    pub fn doc_map(&self, segment_id: u64) -> Option<&DocMap> {
        self.doc_maps.iter().find(|m| m.segment_id == segment_id)
    }

    /// Write the merged segment as `segment_id`.
    pub fn write(&self, storage: &Arc<dyn Storage>, segment_id: u64) -> Result<SegmentInfo> {
        let tombstones = DeletionBitmap::new(self.doc_count());
        let content = SegmentContent {
            terms: self.terms.iter().collect(),
            stored: &self.stored,
            norms: &self.norms,
            tombstones: &tombstones,
        };
        write_segment_content(storage, segment_id, &content)
    }
}

/// Merge `sources` (in commit order) into one segment in memory.
pub fn merge_segments(sources: &[MergeSource]) -> Result<MergedSegment> {
    let mut doc_maps = Vec::with_capacity(sources.len());
    let mut stored = Vec::new();
    let mut next_doc = 0u32;

    for source in sources {
        let reader = &source.reader;
        let mut mapping = Vec::with_capacity(reader.doc_count() as usize);
        for doc_id in 0..reader.doc_count() {
            if source.deletions.is_deleted(doc_id) || reader.tombstones().is_deleted(doc_id) {
                mapping.push(None);
            } else {
                stored.push(reader.stored_fields(doc_id)?);
                mapping.push(Some(next_doc));
                next_doc += 1;
            }
        }
        doc_maps.push(DocMap {
            segment_id: reader.segment_id(),
            mapping,
        });
    }

    let mut terms: BTreeMap<Term, PostingList> = BTreeMap::new();
    for (source, doc_map) in sources.iter().zip(&doc_maps) {
        for entry in source.reader.postings_iter() {
            let (term, list) = entry?;
            let mut remapped = list
                .iter()
                .filter_map(|p| {
                    doc_map
                        .get(p.doc_id)
                        .map(|doc_id| Posting::with_positions(doc_id, p.positions.clone()))
                })
                .peekable();
            if remapped.peek().is_none() {
                continue;
            }
            let merged = terms.entry(term.clone()).or_default();
            for posting in remapped {
                merged.push(posting);
            }
        }
    }

    let doc_count = next_doc as usize;
    let mut norms: AHashMap<String, Vec<u32>> = AHashMap::new();
    for (source, doc_map) in sources.iter().zip(&doc_maps) {
        for (field, lengths) in source.reader.norms() {
            let merged = norms
                .entry(field.to_string())
                .or_insert_with(|| vec![0; doc_count]);
            for (old_doc, &len) in lengths.iter().enumerate() {
                if let Some(new_doc) = doc_map.get(old_doc as u32) {
                    merged[new_doc as usize] = len;
                }
            }
        }
    }
    let mut norms: Vec<(String, Vec<u32>)> = norms.into_iter().collect();
    norms.sort_by(|a, b| a.0.cmp(&b.0));

    debug!(
        "merged {} segments into {doc_count} documents, {} terms",
        sources.len(),
        terms.len()
    );

    Ok(MergedSegment {
        terms,
        stored,
        norms,
        doc_maps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::standard::StandardAnalyzer;
    use crate::lexical::core::document::Document;
    use crate::lexical::core::field::FieldValue;
    use crate::lexical::index::inverted::segment::writer::write_segment;
    use crate::lexical::index::inverted::writer::ActiveSegment;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn build(storage: &Arc<dyn Storage>, segment_id: u64, names: &[&str]) -> Arc<SegmentReader> {
        let mut active = ActiveSegment::new(segment_id);
        for (i, name) in names.iter().enumerate() {
            let doc = Document::new()
                .add_text("name", *name)
                .add_integer("n", i as i64);
            active.add_document(&doc, &StandardAnalyzer::new()).unwrap();
        }
        write_segment(storage, &active).unwrap();
        Arc::new(SegmentReader::open(storage, segment_id).unwrap())
    }

    #[test]
    fn test_merge_renumbers_and_drops_deleted() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let a = build(&storage, 0, &["red apple", "green apple"]);
        let b = build(&storage, 1, &["red car", "blue car", "red bike"]);

        let mut deletions_b = DeletionBitmap::new(3);
        deletions_b.delete(1).unwrap();

        let sources = vec![
            MergeSource {
                reader: a,
                deletions: Arc::new(DeletionBitmap::new(2)),
            },
            MergeSource {
                reader: b,
                deletions: Arc::new(deletions_b),
            },
        ];
        let merged = merge_segments(&sources).unwrap();
        assert_eq!(merged.doc_count(), 4);
        assert_eq!(merged.doc_map(1).unwrap().get(1), None);
        assert_eq!(merged.doc_map(1).unwrap().get(2), Some(3));

        let info = merged.write(&storage, 2).unwrap();
        assert_eq!(info.doc_count, 4);
        let reader = SegmentReader::open(&storage, 2).unwrap();

        let red: Vec<u32> = reader
            .lookup(&Term::new("name", "red"))
            .unwrap()
            .iter()
            .map(|p| p.doc_id)
            .collect();
        assert_eq!(red, vec![0, 2, 3]);
        assert!(reader.lookup(&Term::new("name", "blue")).unwrap().is_empty());
        assert_eq!(reader.term_count(), merged.term_count());

        let stored = reader.stored_fields(3).unwrap();
        assert_eq!(stored.get_text("name"), Some("red bike"));
        assert_eq!(stored.get("n"), Some(&FieldValue::Integer(2)));
        assert_eq!(reader.field_length("name", 3), 2);
    }
}
