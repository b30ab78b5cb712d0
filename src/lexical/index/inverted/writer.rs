//! The active segment: the in-memory posting store documents are written to
//! before they are flushed to an immutable segment file.
//!
//! Documents get consecutive local ids starting at 0. Each indexed field is
//! turned into `(term, doc, position)` occurrences; tokenized text goes
//! through the analyzer, while untokenized and numeric values index as one
//! exact term. Stored values and per-field token counts (norms) are kept for
//! retrieval and scoring.

use ahash::AHashMap;
use bit_vec::BitVec;

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::analysis::analyzer::per_field::PerFieldAnalyzer;
use crate::error::{QuarryError, Result};
use crate::lexical::core::document::{Document, StoredDocument};
use crate::lexical::core::posting::{PostingList, TermPostingIndex};
use crate::lexical::core::term::Term;
use crate::maintenance::deletion::DeletionBitmap;

/// Position gap inserted between two values of the same field, so a phrase
/// never matches across values.
const POSITION_GAP: u32 = 100;

/// Statistics about the writing process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Number of documents added.
    pub docs_added: u64,
    /// Number of unique terms indexed.
    pub unique_terms: u64,
    /// Total term occurrences recorded.
    pub total_positions: u64,
    /// Number of documents tombstoned while still in memory.
    pub deleted_count: u64,
}

/// One analyzed field value, ready to be applied.
struct AnalyzedField {
    field: String,
    terms: Vec<(String, u32)>,
    length: u32,
}

/// The in-memory segment currently receiving documents.
pub struct ActiveSegment {
    /// Segment id reserved for this segment's file.
    segment_id: u64,

    /// In-memory inverted index being built.
    postings: TermPostingIndex,

    /// Stored fields, indexed by local doc id.
    stored: Vec<StoredDocument>,

    /// Per-field token counts, indexed by local doc id. Shorter than the
    /// document count when trailing documents lack the field.
    norms: AHashMap<String, Vec<u32>>,

    /// Tombstones for documents deleted before flush.
    deleted: BitVec,

    /// Approximate bytes held by stored values.
    stored_bytes: usize,

    stats: WriterStats,
}

impl std::fmt::Debug for ActiveSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSegment")
            .field("segment_id", &self.segment_id)
            .field("doc_count", &self.doc_count())
            .field("term_count", &self.postings.term_count())
            .field("stats", &self.stats)
            .finish()
    }
}

impl ActiveSegment {
    /// Create an empty active segment that will be written as `segment_id`.
    pub fn new(segment_id: u64) -> Self {
        ActiveSegment {
            segment_id,
            postings: TermPostingIndex::new(),
            stored: Vec::new(),
            norms: AHashMap::new(),
            deleted: BitVec::new(),
            stored_bytes: 0,
            stats: WriterStats::default(),
        }
    }

    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Add a document and return its local id.
    ///
    /// The document is validated and fully analyzed before anything is
    /// recorded, so a failure leaves the segment unchanged.
    pub fn add_document(&mut self, doc: &Document, analyzer: &dyn Analyzer) -> Result<u32> {
        doc.validate()?;
        let doc_id = u32::try_from(self.stored.len())
            .map_err(|_| QuarryError::index("active segment is full"))?;

        let analyzed = Self::analyze_document(doc, analyzer)?;

        for field in analyzed {
            for (text, position) in field.terms {
                if self
                    .postings
                    .add_occurrence(Term::new(field.field.clone(), text), doc_id, position)
                {
                    self.stats.unique_terms += 1;
                }
                self.stats.total_positions += 1;
            }
            let norms = self.norms.entry(field.field).or_default();
            if norms.len() <= doc_id as usize {
                norms.resize(doc_id as usize + 1, 0);
            }
            norms[doc_id as usize] += field.length;
        }

        let stored = doc.to_stored();
        self.stored_bytes += stored_size(&stored);
        self.stored.push(stored);
        self.deleted.push(false);
        self.stats.docs_added += 1;

        Ok(doc_id)
    }

    /// Tokenize every indexed field of `doc`.
    fn analyze_document(doc: &Document, analyzer: &dyn Analyzer) -> Result<Vec<AnalyzedField>> {
        let per_field = analyzer.as_any().downcast_ref::<PerFieldAnalyzer>();
        // Next free position per field, for multi-valued fields.
        let mut next_position: AHashMap<&str, u32> = AHashMap::new();
        let mut analyzed = Vec::new();

        for field in doc.fields().iter().filter(|f| f.option.indexed) {
            let base = next_position.get(field.name.as_str()).copied().unwrap_or(0);
            let mut terms = Vec::new();

            if field.is_analyzed() {
                let text = field.value.as_text().unwrap_or_default();
                let tokens = match per_field {
                    Some(per_field) => per_field.analyze_field(&field.name, text)?,
                    None => analyzer.analyze(text)?,
                };
                for token in tokens {
                    let position = base.checked_add(token.position).ok_or_else(|| {
                        QuarryError::input(format!(
                            "token position {} overflows field '{}'",
                            token.position, field.name
                        ))
                    })?;
                    terms.push((token.text, position));
                }
            } else {
                terms.push((field.value.term_text(), base));
            }

            let last = terms.iter().map(|(_, pos)| *pos).max();
            if let Some(last) = last {
                next_position.insert(
                    field.name.as_str(),
                    last.saturating_add(1 + POSITION_GAP),
                );
            }
            analyzed.push(AnalyzedField {
                field: field.name.clone(),
                length: terms.len() as u32,
                terms,
            });
        }

        Ok(analyzed)
    }

    /// Tombstone every live document containing `term`. Returns how many
    /// documents were newly deleted.
    pub fn delete_by_term(&mut self, term: &Term) -> u32 {
        let doc_ids: Vec<u32> = match self.postings.get(term) {
            Some(list) => list.iter().map(|p| p.doc_id).collect(),
            None => return 0,
        };
        doc_ids
            .into_iter()
            .filter(|&doc_id| self.delete(doc_id))
            .count() as u32
    }

    /// Tombstone one document. Returns `true` if it was live.
    pub fn delete(&mut self, doc_id: u32) -> bool {
        match self.deleted.get(doc_id as usize) {
            Some(false) => {
                self.deleted.set(doc_id as usize, true);
                self.stats.deleted_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Tombstone every document. Returns how many were live.
    pub fn delete_all(&mut self) -> u32 {
        (0..self.doc_count()).filter(|&doc_id| self.delete(doc_id)).count() as u32
    }

    pub fn is_deleted(&self, doc_id: u32) -> bool {
        self.deleted.get(doc_id as usize).unwrap_or(true)
    }

    /// Posting list of `term`, if present.
    pub fn postings(&self, term: &Term) -> Option<&PostingList> {
        self.postings.get(term)
    }

    pub fn term_index(&self) -> &TermPostingIndex {
        &self.postings
    }

    /// Stored fields of a live document.
    pub fn stored_document(&self, doc_id: u32) -> Option<&StoredDocument> {
        if self.is_deleted(doc_id) {
            return None;
        }
        self.stored.get(doc_id as usize)
    }

    /// Stored fields of every document, tombstoned ones included.
    pub fn stored_documents(&self) -> &[StoredDocument] {
        &self.stored
    }

    /// Token count of `field` in `doc_id` (0 when absent).
    pub fn field_length(&self, field: &str, doc_id: u32) -> u32 {
        self.norms
            .get(field)
            .and_then(|norms| norms.get(doc_id as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Per-field token counts, padded to the document count.
    pub fn norms(&self) -> Vec<(String, Vec<u32>)> {
        let doc_count = self.stored.len();
        let mut norms: Vec<(String, Vec<u32>)> = self
            .norms
            .iter()
            .map(|(field, lengths)| {
                let mut lengths = lengths.clone();
                lengths.resize(doc_count, 0);
                (field.clone(), lengths)
            })
            .collect();
        norms.sort_by(|a, b| a.0.cmp(&b.0));
        norms
    }

    /// Sum of token counts of `field` over all documents.
    pub fn total_field_length(&self, field: &str) -> u64 {
        self.norms
            .get(field)
            .map(|norms| norms.iter().map(|&len| len as u64).sum())
            .unwrap_or(0)
    }

    /// Tombstones as a bitmap over the current documents.
    pub fn tombstones(&self) -> DeletionBitmap {
        DeletionBitmap::from_bitvec(self.deleted.clone())
    }

    /// Reset the tombstones of the first `tombstones.doc_count()` documents
    /// to `tombstones`.
    pub fn restore_tombstones(&mut self, tombstones: &DeletionBitmap) {
        let len = (tombstones.doc_count() as usize).min(self.deleted.len());
        for doc_id in 0..len {
            self.deleted.set(doc_id, tombstones.is_deleted(doc_id as u32));
        }
        self.stats.deleted_count = self.deleted.iter().filter(|deleted| *deleted).count() as u64;
    }

    /// Remove every document with an id at or above `doc_count`, undoing the
    /// adds that created them.
    pub fn truncate(&mut self, doc_count: u32) {
        if doc_count >= self.doc_count() {
            return;
        }
        let (terms, positions) = self.postings.truncate_docs(doc_count);
        self.stats.unique_terms = self.stats.unique_terms.saturating_sub(terms);
        self.stats.total_positions = self.stats.total_positions.saturating_sub(positions);

        self.norms.retain(|_, norms| {
            norms.truncate(doc_count as usize);
            !norms.is_empty()
        });

        let removed = self.stored.split_off(doc_count as usize);
        self.stored_bytes = self
            .stored_bytes
            .saturating_sub(removed.iter().map(stored_size).sum());
        self.stats.docs_added = self.stats.docs_added.saturating_sub(removed.len() as u64);

        self.deleted.truncate(doc_count as usize);
        self.stats.deleted_count = self.deleted.iter().filter(|deleted| *deleted).count() as u64;
    }

    /// Number of documents added, deleted ones included.
    pub fn doc_count(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn live_count(&self) -> u32 {
        self.doc_count() - self.stats.deleted_count as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Estimated heap usage, for flush triggering.
    pub fn memory_usage(&self) -> usize {
        let term_memory = self
            .postings
            .iter()
            .map(|(term, list)| term.heap_size() + list.heap_size() + 64)
            .sum::<usize>();
        let norm_memory = self
            .norms
            .values()
            .map(|norms| norms.capacity() * std::mem::size_of::<u32>())
            .sum::<usize>();
        term_memory + norm_memory + self.stored_bytes + self.stored.len() * 64
    }

    /// Take the contents out, leaving an empty segment reserved under
    /// `next_segment_id`.
    pub fn take(&mut self, next_segment_id: u64) -> ActiveSegment {
        std::mem::replace(self, ActiveSegment::new(next_segment_id))
    }
}

fn stored_size(stored: &StoredDocument) -> usize {
    stored
        .iter()
        .map(|(name, value)| name.len() + value.to_string().len() + 16)
        .sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::analyzer::keyword::KeywordAnalyzer;
    use crate::analysis::analyzer::standard::StandardAnalyzer;
    use crate::lexical::core::field::{Field, FieldValue};

    fn kemp() -> Document {
        Document::new()
            .add_text("name", "Kemp test")
            .add_integer("age", 26)
    }

    #[test]
    fn test_add_document_indexes_terms_and_positions() {
        let mut segment = ActiveSegment::new(0);
        let analyzer = StandardAnalyzer::new();
        let doc_id = segment.add_document(&kemp(), &analyzer).unwrap();
        assert_eq!(doc_id, 0);

        let kemp_list = segment.postings(&Term::new("name", "kemp")).unwrap();
        assert_eq!(kemp_list.get(0).unwrap().positions, vec![0]);
        let test_list = segment.postings(&Term::new("name", "test")).unwrap();
        assert_eq!(test_list.get(0).unwrap().positions, vec![1]);
        assert!(segment.postings(&Term::integer("age", 26)).is_some());

        assert_eq!(segment.field_length("name", 0), 2);
        assert_eq!(segment.field_length("age", 0), 1);
        assert_eq!(
            segment.stored_document(0).unwrap().get("age"),
            Some(&FieldValue::Integer(26))
        );
    }

    #[test]
    fn test_invalid_document_leaves_segment_untouched() {
        let mut segment = ActiveSegment::new(0);
        let analyzer = StandardAnalyzer::new();
        assert!(segment.add_document(&Document::new(), &analyzer).is_err());
        let bad = Document::new()
            .add_text("name", "ok")
            .with_field(Field::float("score", f64::INFINITY));
        assert!(segment.add_document(&bad, &analyzer).is_err());
        assert!(segment.is_empty());
        assert!(segment.term_index().is_empty());
    }

    #[test]
    fn test_per_field_analyzer_is_used() {
        let analyzer = PerFieldAnalyzer::default().with_field("id", Arc::new(KeywordAnalyzer::new()));
        let mut segment = ActiveSegment::new(0);
        let doc = Document::new()
            .add_text("id", "ABC-1")
            .add_text("body", "ABC-1");
        segment.add_document(&doc, &analyzer).unwrap();

        assert!(segment.postings(&Term::new("id", "ABC-1")).is_some());
        assert!(segment.postings(&Term::new("body", "abc")).is_some());
        assert!(segment.postings(&Term::new("body", "ABC-1")).is_none());
    }

    #[test]
    fn test_multi_valued_field_positions_do_not_touch() {
        let mut segment = ActiveSegment::new(0);
        let doc = Document::new()
            .add_text("tag", "red fox")
            .add_text("tag", "blue sky");
        segment.add_document(&doc, &StandardAnalyzer::new()).unwrap();

        let fox = segment.postings(&Term::new("tag", "fox")).unwrap();
        let blue = segment.postings(&Term::new("tag", "blue")).unwrap();
        assert!(blue.get(0).unwrap().positions[0] > fox.get(0).unwrap().positions[0] + 1);
        assert_eq!(segment.field_length("tag", 0), 4);
    }

    #[test]
    fn test_delete_by_term() {
        let mut segment = ActiveSegment::new(0);
        let analyzer = StandardAnalyzer::new();
        segment.add_document(&kemp(), &analyzer).unwrap();
        segment
            .add_document(&Document::new().add_integer("age", 30), &analyzer)
            .unwrap();

        assert_eq!(segment.delete_by_term(&Term::integer("age", 26)), 1);
        assert_eq!(segment.delete_by_term(&Term::integer("age", 26)), 0);
        assert!(segment.is_deleted(0));
        assert!(segment.stored_document(0).is_none());
        assert_eq!(segment.live_count(), 1);
        assert_eq!(segment.tombstones().deleted_docs().collect::<Vec<_>>(), vec![0]);
    }

    /// Emits `x` at position 2, then at position 0.
    #[derive(Debug)]
    struct BackwardsAnalyzer;

    impl Analyzer for BackwardsAnalyzer {
        fn analyze<'a>(&self, _text: &'a str) -> Result<crate::analysis::token::TokenStream<'a>> {
            use crate::analysis::token::Token;
            Ok(Box::new(
                vec![Token::new("x", 2, 0, 1), Token::new("x", 0, 2, 3)].into_iter(),
            ))
        }

        fn name(&self) -> &'static str {
            "backwards"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_backwards_positions_are_sorted() {
        let mut segment = ActiveSegment::new(0);
        segment
            .add_document(&Document::new().add_text("body", "x x"), &BackwardsAnalyzer)
            .unwrap();
        let list = segment.postings(&Term::new("body", "x")).unwrap();
        assert_eq!(list.get(0).unwrap().positions, vec![0, 2]);
        assert_eq!(segment.field_length("body", 0), 2);
    }

    #[test]
    fn test_truncate_undoes_adds() {
        let analyzer = StandardAnalyzer::new();
        let mut segment = ActiveSegment::new(0);
        segment.add_document(&kemp(), &analyzer).unwrap();
        let stats = segment.stats().clone();

        segment
            .add_document(&Document::new().add_text("name", "kemp ghost"), &analyzer)
            .unwrap();
        segment
            .add_document(&Document::new().add_text("title", "ghost"), &analyzer)
            .unwrap();
        segment.delete(2);
        segment.truncate(1);

        assert_eq!(segment.doc_count(), 1);
        assert_eq!(segment.stats(), &stats);
        assert!(segment.postings(&Term::new("name", "ghost")).is_none());
        assert!(segment.postings(&Term::new("title", "ghost")).is_none());
        assert_eq!(segment.postings(&Term::new("name", "kemp")).unwrap().doc_frequency(), 1);
        assert_eq!(segment.total_field_length("title"), 0);
        assert!(segment.tombstones().deleted_docs().next().is_none());
    }

    #[test]
    fn test_restore_tombstones() {
        let analyzer = StandardAnalyzer::new();
        let mut segment = ActiveSegment::new(0);
        segment.add_document(&kemp(), &analyzer).unwrap();
        segment.add_document(&kemp(), &analyzer).unwrap();
        segment.delete(0);
        let saved = segment.tombstones();

        segment.delete(1);
        assert_eq!(segment.live_count(), 0);
        segment.restore_tombstones(&saved);
        assert_eq!(segment.live_count(), 1);
        assert!(segment.is_deleted(0));
        assert!(!segment.is_deleted(1));
    }

    #[test]
    fn test_memory_usage_grows_and_take_resets() {
        let mut segment = ActiveSegment::new(3);
        let empty = segment.memory_usage();
        segment.add_document(&kemp(), &StandardAnalyzer::new()).unwrap();
        assert!(segment.memory_usage() > empty);

        let taken = segment.take(4);
        assert_eq!(taken.segment_id(), 3);
        assert_eq!(taken.doc_count(), 1);
        assert_eq!(segment.segment_id(), 4);
        assert!(segment.is_empty());
    }
}
