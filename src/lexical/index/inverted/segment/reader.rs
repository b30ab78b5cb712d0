//! Segment file loading and lookup.
//!
//! [`SegmentReader::open`] reads the whole file, verifies the header and the
//! body checksum, and parses the dictionary, stored-field offsets, norms and
//! tombstones up front. Posting lists stay encoded until looked up.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{QuarryError, Result};
use crate::lexical::core::document::StoredDocument;
use crate::lexical::core::field::FieldValue;
use crate::lexical::core::posting::PostingList;
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::segment::writer::{
    HEADER_LEN, SEGMENT_MAGIC, SEGMENT_VERSION, TAG_FLOAT, TAG_INTEGER, TAG_TEXT,
};
use crate::lexical::index::inverted::segment::{segment_file_name, segment_name};
use crate::maintenance::deletion::DeletionBitmap;
use crate::storage::Storage;
use crate::storage::structured::StructReader;

/// Dictionary entry of one term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term: Term,
    pub doc_frequency: u32,
    offset: u64,
    length: u32,
}

/// Token counts of one field.
#[derive(Debug, Clone, Default)]
struct FieldNorms {
    total_length: u64,
    lengths: Vec<u32>,
}

/// Read-only view of one segment file.
#[derive(Debug)]
pub struct SegmentReader {
    segment_id: u64,
    doc_count: u32,
    dictionary: Vec<TermEntry>,
    postings: Vec<u8>,
    stored_offsets: Vec<u64>,
    stored_records: Vec<u8>,
    norms: AHashMap<String, FieldNorms>,
    tombstones: DeletionBitmap,
    file_size: usize,
}

impl SegmentReader {
    /// Load and validate segment `segment_id`.
    ///
    /// A missing file fails with `NotFound`; any validation failure with
    /// `CorruptSegment`.
    pub fn open(storage: &Arc<dyn Storage>, segment_id: u64) -> Result<Self> {
        let data = storage.read_file(&segment_file_name(segment_id))?;
        Self::from_bytes(segment_id, &data)
    }

    /// Parse a segment from its file content.
    pub fn from_bytes(segment_id: u64, data: &[u8]) -> Result<Self> {
        let name = segment_name(segment_id);
        Self::parse(segment_id, data).map_err(|e| match e {
            QuarryError::CorruptSegment { .. } => e,
            other => QuarryError::corrupt(name, other.to_string()),
        })
    }

    fn parse(segment_id: u64, data: &[u8]) -> Result<Self> {
        let name = segment_name(segment_id);
        if data.len() < HEADER_LEN {
            return Err(QuarryError::corrupt(
                &name,
                format!("file has {} bytes, shorter than the header", data.len()),
            ));
        }

        let mut header = StructReader::new(&data[..HEADER_LEN]);
        let magic = header.read_u32()?;
        if magic != SEGMENT_MAGIC {
            return Err(QuarryError::corrupt(&name, format!("bad magic {magic:#010x}")));
        }
        let version = header.read_u32()?;
        if version != SEGMENT_VERSION {
            return Err(QuarryError::corrupt(
                &name,
                format!("unsupported format version {version}"),
            ));
        }
        let doc_count = header.read_u32()?;
        let checksum = header.read_u32()?;
        let body_len = header.read_u64()?;

        let body = &data[HEADER_LEN..];
        if body.len() as u64 != body_len {
            return Err(QuarryError::corrupt(
                &name,
                format!("body has {} bytes, header says {body_len}", body.len()),
            ));
        }
        if crc32fast::hash(body) != checksum {
            return Err(QuarryError::corrupt(&name, "checksum mismatch"));
        }

        let mut reader = StructReader::new(body);

        // Dictionary
        let term_count = reader.read_u32()? as usize;
        let mut dictionary = Vec::with_capacity(term_count.min(reader.remaining()));
        for _ in 0..term_count {
            let field = reader.read_string()?;
            let text = reader.read_string()?;
            let doc_frequency = reader.read_u32()?;
            let offset = reader.read_u64()?;
            let length = reader.read_u32()?;
            dictionary.push(TermEntry {
                term: Term::new(field, text),
                doc_frequency,
                offset,
                length,
            });
        }
        if dictionary.windows(2).any(|pair| pair[0].term >= pair[1].term) {
            return Err(QuarryError::corrupt(&name, "term dictionary is not sorted"));
        }

        // Postings
        let postings_len = reader.read_u64()? as usize;
        let postings = reader.read_raw(postings_len)?.to_vec();
        if let Some(entry) = dictionary
            .iter()
            .find(|e| e.offset + e.length as u64 > postings.len() as u64)
        {
            return Err(QuarryError::corrupt(
                &name,
                format!("postings of {} point past the posting block", entry.term),
            ));
        }

        // Stored fields
        let stored_count = reader.read_u32()?;
        if stored_count != doc_count {
            return Err(QuarryError::corrupt(
                &name,
                format!("{stored_count} stored records for {doc_count} documents"),
            ));
        }
        let mut stored_offsets = Vec::with_capacity((stored_count as usize).min(reader.remaining()));
        for _ in 0..stored_count {
            stored_offsets.push(reader.read_u64()?);
        }
        let records_len = reader.read_u64()? as usize;
        let stored_records = reader.read_raw(records_len)?.to_vec();
        if stored_offsets.iter().any(|&o| o as usize > stored_records.len()) {
            return Err(QuarryError::corrupt(&name, "stored field offset out of range"));
        }

        // Norms
        let field_count = reader.read_u32()?;
        let mut norms = AHashMap::new();
        for _ in 0..field_count {
            let field = reader.read_string()?;
            let total_length = reader.read_u64()?;
            let mut lengths = Vec::with_capacity((doc_count as usize).min(reader.remaining()));
            for _ in 0..doc_count {
                let len = u32::try_from(reader.read_varint()?).map_err(|_| {
                    QuarryError::corrupt(&name, format!("field length overflow in '{field}'"))
                })?;
                lengths.push(len);
            }
            norms.insert(
                field,
                FieldNorms {
                    total_length,
                    lengths,
                },
            );
        }

        // Tombstones
        let tombstones = DeletionBitmap::from_bytes(doc_count, reader.read_bytes()?)?;

        if !reader.is_eof() {
            return Err(QuarryError::corrupt(
                &name,
                format!("{} trailing bytes after body", reader.remaining()),
            ));
        }

        Ok(SegmentReader {
            segment_id,
            doc_count,
            dictionary,
            postings,
            stored_offsets,
            stored_records,
            norms,
            tombstones,
            file_size: data.len(),
        })
    }

    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    pub fn name(&self) -> String {
        segment_name(self.segment_id)
    }

    /// Documents in the file, deleted ones included.
    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Documents deleted when the segment was written.
    pub fn tombstones(&self) -> &DeletionBitmap {
        &self.tombstones
    }

    pub fn term_count(&self) -> usize {
        self.dictionary.len()
    }

    pub fn file_size(&self) -> usize {
        self.file_size
    }

    fn find(&self, term: &Term) -> Option<&TermEntry> {
        self.dictionary
            .binary_search_by(|entry| entry.term.cmp(term))
            .ok()
            .map(|idx| &self.dictionary[idx])
    }

    /// Number of documents containing `term` (0 when absent).
    pub fn doc_frequency(&self, term: &Term) -> u32 {
        self.find(term).map(|e| e.doc_frequency).unwrap_or(0)
    }

    /// Posting list of `term`; empty when the term is absent.
    pub fn lookup(&self, term: &Term) -> Result<PostingList> {
        match self.find(term) {
            Some(entry) => self.decode_postings(entry),
            None => Ok(PostingList::new()),
        }
    }

    fn decode_postings(&self, entry: &TermEntry) -> Result<PostingList> {
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        let mut reader = StructReader::new(&self.postings[start..end]);
        PostingList::decode(&mut reader).map_err(|e| {
            QuarryError::corrupt(self.name(), format!("postings of {}: {e}", entry.term))
        })
    }

    /// Dictionary entries in term order.
    pub fn terms(&self) -> impl Iterator<Item = &TermEntry> {
        self.dictionary.iter()
    }

    /// Terms with their decoded posting lists, in term order.
    pub fn postings_iter(&self) -> impl Iterator<Item = Result<(&Term, PostingList)>> {
        self.dictionary
            .iter()
            .map(|entry| self.decode_postings(entry).map(|list| (&entry.term, list)))
    }

    /// Stored fields of `doc_id`.
    ///
    /// Fails with `NotFound` when the id is out of range or the document was
    /// deleted when the segment was written.
    pub fn stored_fields(&self, doc_id: u32) -> Result<StoredDocument> {
        if doc_id >= self.doc_count {
            return Err(QuarryError::not_found(format!(
                "document {doc_id} in segment {} ({} documents)",
                self.name(),
                self.doc_count
            )));
        }
        if self.tombstones.is_deleted(doc_id) {
            return Err(QuarryError::not_found(format!(
                "document {doc_id} in segment {} is deleted",
                self.name()
            )));
        }
        self.read_stored(doc_id)
            .map_err(|e| QuarryError::corrupt(self.name(), format!("stored document {doc_id}: {e}")))
    }

    fn read_stored(&self, doc_id: u32) -> Result<StoredDocument> {
        let offset = self.stored_offsets[doc_id as usize];
        let mut records = StructReader::new(&self.stored_records);
        records.seek(offset);
        let mut reader = StructReader::new(records.read_bytes()?);

        let count = reader.read_varint()? as usize;
        let mut fields = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let name = reader.read_string()?;
            let value = match reader.read_u8()? {
                TAG_TEXT => FieldValue::Text(reader.read_string()?),
                TAG_INTEGER => FieldValue::Integer(reader.read_i64()?),
                TAG_FLOAT => FieldValue::Float(reader.read_f64()?),
                tag => return Err(QuarryError::index(format!("unknown value tag {tag}"))),
            };
            fields.push((name, value));
        }
        Ok(StoredDocument::new(fields))
    }

    /// Token count of `field` in `doc_id` (0 when absent).
    pub fn field_length(&self, field: &str, doc_id: u32) -> u32 {
        self.norms
            .get(field)
            .and_then(|norms| norms.lengths.get(doc_id as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Per-field token counts, sorted by field name.
    pub fn norms(&self) -> Vec<(&str, &[u32])> {
        let mut norms: Vec<(&str, &[u32])> = self
            .norms
            .iter()
            .map(|(field, norms)| (field.as_str(), norms.lengths.as_slice()))
            .collect();
        norms.sort_by(|a, b| a.0.cmp(b.0));
        norms
    }

    /// Sum of token counts of `field` over all documents.
    pub fn total_field_length(&self, field: &str) -> u64 {
        self.norms.get(field).map(|n| n.total_length).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::standard::StandardAnalyzer;
    use crate::lexical::core::document::Document;
    use crate::lexical::index::inverted::segment::writer::{encode_segment, write_segment};
    use crate::lexical::index::inverted::writer::ActiveSegment;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn sample_segment() -> ActiveSegment {
        let analyzer = StandardAnalyzer::new();
        let mut active = ActiveSegment::new(1);
        let docs = [
            Document::new().add_text("name", "Kemp test").add_integer("age", 26),
            Document::new().add_text("name", "Another test").add_float("score", 1.5),
            Document::new().add_text("name", "third").add_integer("age", 26),
        ];
        for doc in &docs {
            active.add_document(doc, &analyzer).unwrap();
        }
        active
    }

    #[test]
    fn test_roundtrip_preserves_dictionary_postings_and_stored_fields() {
        let storage = storage();
        let active = sample_segment();
        write_segment(&storage, &active).unwrap();
        let reader = SegmentReader::open(&storage, 1).unwrap();

        assert_eq!(reader.doc_count(), 3);
        assert_eq!(reader.term_count(), active.term_index().term_count());
        for (term, list) in active.term_index().iter() {
            assert_eq!(&reader.lookup(term).unwrap(), list, "postings of {term}");
            assert_eq!(reader.doc_frequency(term), list.doc_frequency());
        }
        let terms: Vec<&Term> = reader.terms().map(|e| &e.term).collect();
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);

        for doc_id in 0..3 {
            assert_eq!(
                &reader.stored_fields(doc_id).unwrap(),
                active.stored_document(doc_id).unwrap()
            );
        }
        assert_eq!(reader.field_length("name", 1), 2);
        assert_eq!(reader.total_field_length("name"), 5);
    }

    #[test]
    fn test_missing_term_and_document() {
        let storage = storage();
        write_segment(&storage, &sample_segment()).unwrap();
        let reader = SegmentReader::open(&storage, 1).unwrap();

        assert!(reader.lookup(&Term::new("name", "nothing")).unwrap().is_empty());
        assert!(reader.stored_fields(3).unwrap_err().is_not_found());
    }

    #[test]
    fn test_tombstoned_document_is_not_found() {
        let storage = storage();
        let mut active = sample_segment();
        active.delete(1);
        write_segment(&storage, &active).unwrap();
        let reader = SegmentReader::open(&storage, 1).unwrap();

        assert!(reader.tombstones().is_deleted(1));
        assert!(reader.stored_fields(1).unwrap_err().is_not_found());
        assert!(reader.stored_fields(0).is_ok());
    }

    #[test]
    fn test_corruption_is_detected() {
        let active = sample_segment();
        let norms = active.norms();
        let tombstones = active.tombstones();
        let index = active.term_index();
        let content = crate::lexical::index::inverted::segment::writer::SegmentContent {
            terms: index
                .sorted_terms()
                .into_iter()
                .map(|t| (t, index.get(t).unwrap()))
                .collect(),
            stored: active.stored_documents(),
            norms: &norms,
            tombstones: &tombstones,
        };
        let data = encode_segment(&content).unwrap();
        assert!(SegmentReader::from_bytes(1, &data).is_ok());

        let mut bad_magic = data.clone();
        bad_magic[0] ^= 0xff;
        assert!(SegmentReader::from_bytes(1, &bad_magic).unwrap_err().is_corruption());

        let mut bad_version = data.clone();
        bad_version[4] = 99;
        assert!(SegmentReader::from_bytes(1, &bad_version).unwrap_err().is_corruption());

        let mut flipped = data.clone();
        let mid = HEADER_LEN + (data.len() - HEADER_LEN) / 2;
        flipped[mid] ^= 0x10;
        let err = SegmentReader::from_bytes(1, &flipped).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum"));

        let truncated = &data[..data.len() - 3];
        assert!(SegmentReader::from_bytes(1, truncated).unwrap_err().is_corruption());

        assert!(SegmentReader::from_bytes(1, &data[..10]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let storage = storage();
        assert!(SegmentReader::open(&storage, 9).unwrap_err().is_not_found());
    }
}
