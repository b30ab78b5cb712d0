//! Segment file serialization.
//!
//! Layout (little-endian):
//!
//! ```text
//! header: magic "QSEG" u32 | version u32 | doc count u32 | crc32(body) u32 | body length u64
//! body:
//!   dictionary   term count u32, per term: field, text, doc freq u32, posting offset u64, posting length u32
//!   postings     length u64, then each term's encoded posting list
//!   stored       record count u32, offsets u64 * count, records length u64, records
//!   norms        field count u32, per field: name, total length u64, per-doc token count varint
//!   tombstones   bitmap bytes (varint length prefixed)
//! ```
//!
//! Strings are varint-length-prefixed UTF-8. Terms appear in dictionary
//! order, so readers can binary search them.

use std::sync::Arc;

use log::debug;

use crate::error::{QuarryError, Result};
use crate::lexical::core::document::StoredDocument;
use crate::lexical::core::field::FieldValue;
use crate::lexical::core::posting::PostingList;
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::segment::{SegmentInfo, segment_file_name};
use crate::lexical::index::inverted::writer::ActiveSegment;
use crate::maintenance::deletion::DeletionBitmap;
use crate::storage::Storage;
use crate::storage::structured::StructWriter;

/// Magic number of segment files ("QSEG").
pub const SEGMENT_MAGIC: u32 = 0x5153_4547;

/// Current segment format version.
pub const SEGMENT_VERSION: u32 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 24;

pub(crate) const TAG_TEXT: u8 = 0;
pub(crate) const TAG_INTEGER: u8 = 1;
pub(crate) const TAG_FLOAT: u8 = 2;

/// Everything a segment file holds, borrowed from its producer.
#[derive(Debug)]
pub struct SegmentContent<'a> {
    /// Terms in dictionary order with their posting lists.
    pub terms: Vec<(&'a Term, &'a PostingList)>,

    /// Stored fields, one entry per document.
    pub stored: &'a [StoredDocument],

    /// Per-field token counts, each vector as long as `stored`.
    pub norms: &'a [(String, Vec<u32>)],

    /// Documents already deleted when the segment is written.
    pub tombstones: &'a DeletionBitmap,
}

impl SegmentContent<'_> {
    pub fn doc_count(&self) -> u32 {
        self.stored.len() as u32
    }

    fn check(&self) -> Result<()> {
        let doc_count = self.stored.len();
        if self.tombstones.doc_count() as usize != doc_count {
            return Err(QuarryError::index(format!(
                "tombstone bitmap covers {} documents, segment has {doc_count}",
                self.tombstones.doc_count()
            )));
        }
        if let Some((field, norms)) = self.norms.iter().find(|(_, n)| n.len() != doc_count) {
            return Err(QuarryError::index(format!(
                "norms of field '{field}' cover {} documents, segment has {doc_count}",
                norms.len()
            )));
        }
        if self.terms.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
            return Err(QuarryError::index("segment terms are not strictly sorted"));
        }
        Ok(())
    }
}

/// Encode a complete segment file.
pub fn encode_segment(content: &SegmentContent<'_>) -> Result<Vec<u8>> {
    content.check()?;

    let mut body = StructWriter::new();

    // Postings first, into their own buffer, so the dictionary knows offsets.
    let mut postings = StructWriter::new();
    let mut entries = Vec::with_capacity(content.terms.len());
    for (term, list) in &content.terms {
        let offset = postings.position();
        list.encode(&mut postings)?;
        let length = postings.position() - offset;
        entries.push((*term, list.doc_frequency(), offset, length as u32));
    }
    let postings = postings.into_inner();

    body.write_u32(entries.len() as u32)?;
    for (term, doc_freq, offset, length) in entries {
        body.write_string(term.field())?;
        body.write_string(term.text())?;
        body.write_u32(doc_freq)?;
        body.write_u64(offset)?;
        body.write_u32(length)?;
    }

    body.write_u64(postings.len() as u64)?;
    body.write_raw(&postings)?;

    write_stored_documents(&mut body, content.stored)?;

    body.write_u32(content.norms.len() as u32)?;
    for (field, lengths) in content.norms {
        body.write_string(field)?;
        body.write_u64(lengths.iter().map(|&len| len as u64).sum())?;
        for &len in lengths {
            body.write_varint(len as u64)?;
        }
    }

    body.write_bytes(&content.tombstones.to_bytes())?;

    let body = body.into_inner();
    let mut file = StructWriter::with_capacity(HEADER_LEN + body.len());
    file.write_u32(SEGMENT_MAGIC)?;
    file.write_u32(SEGMENT_VERSION)?;
    file.write_u32(content.doc_count())?;
    file.write_u32(crc32fast::hash(&body))?;
    file.write_u64(body.len() as u64)?;
    file.write_raw(&body)?;
    Ok(file.into_inner())
}

/// Write stored documents with type information preserved.
fn write_stored_documents(body: &mut StructWriter, stored: &[StoredDocument]) -> Result<()> {
    let mut records = StructWriter::new();
    let mut offsets = Vec::with_capacity(stored.len());
    for doc in stored {
        offsets.push(records.position());
        let mut record = StructWriter::new();
        record.write_varint(doc.len() as u64)?;
        for (name, value) in doc.iter() {
            record.write_string(name)?;
            match value {
                FieldValue::Text(text) => {
                    record.write_u8(TAG_TEXT)?;
                    record.write_string(text)?;
                }
                FieldValue::Integer(i) => {
                    record.write_u8(TAG_INTEGER)?;
                    record.write_i64(*i)?;
                }
                FieldValue::Float(f) => {
                    record.write_u8(TAG_FLOAT)?;
                    record.write_f64(*f)?;
                }
            }
        }
        records.write_bytes(&record.into_inner())?;
    }
    let records = records.into_inner();

    body.write_u32(stored.len() as u32)?;
    for offset in offsets {
        body.write_u64(offset)?;
    }
    body.write_u64(records.len() as u64)?;
    body.write_raw(&records)
}

/// Encode `content` and write it atomically as segment `segment_id`.
pub fn write_segment_content(
    storage: &Arc<dyn Storage>,
    segment_id: u64,
    content: &SegmentContent<'_>,
) -> Result<SegmentInfo> {
    let data = encode_segment(content)?;
    let file_name = segment_file_name(segment_id);
    storage.write_atomic(&file_name, &data)?;

    debug!(
        "wrote segment {file_name}: {} docs, {} terms, {} bytes",
        content.doc_count(),
        content.terms.len(),
        data.len()
    );

    Ok(SegmentInfo {
        segment_id,
        doc_count: content.doc_count(),
        deletion_generation: 0,
        deleted_count: content.tombstones.deleted_count(),
    })
}

/// Flush an active segment to its reserved segment file.
pub fn write_segment(storage: &Arc<dyn Storage>, segment: &ActiveSegment) -> Result<SegmentInfo> {
    let norms = segment.norms();
    let tombstones = segment.tombstones();
    let index = segment.term_index();
    let terms = index
        .sorted_terms()
        .into_iter()
        .filter_map(|term| index.get(term).map(|list| (term, list)))
        .collect();
    let content = SegmentContent {
        terms,
        stored: segment.stored_documents(),
        norms: &norms,
        tombstones: &tombstones,
    };
    write_segment_content(storage, segment.segment_id(), &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::standard::StandardAnalyzer;
    use crate::lexical::core::document::Document;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    #[test]
    fn test_write_segment_produces_header() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let mut active = ActiveSegment::new(2);
        active
            .add_document(
                &Document::new().add_text("name", "Kemp test"),
                &StandardAnalyzer::new(),
            )
            .unwrap();

        let info = write_segment(&storage, &active).unwrap();
        assert_eq!(info, SegmentInfo::new(2, 1));

        let data = storage.read_file("seg_00000002.seg").unwrap();
        assert_eq!(&data[0..4], &SEGMENT_MAGIC.to_le_bytes());
        assert_eq!(&data[4..8], &SEGMENT_VERSION.to_le_bytes());
        assert_eq!(&data[8..12], &1u32.to_le_bytes());
        let body_len = u64::from_le_bytes(data[16..24].try_into().unwrap());
        assert_eq!(body_len as usize, data.len() - HEADER_LEN);
    }

    #[test]
    fn test_unsorted_terms_are_rejected() {
        let a = Term::new("f", "a");
        let b = Term::new("f", "b");
        let list = PostingList::new();
        let tombstones = DeletionBitmap::new(0);
        let content = SegmentContent {
            terms: vec![(&b, &list), (&a, &list)],
            stored: &[],
            norms: &[],
            tombstones: &tombstones,
        };
        assert!(encode_segment(&content).is_err());
    }
}
