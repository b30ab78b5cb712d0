//! Bitmap-based logical deletion.
//!
//! A segment file is never rewritten once written. Documents deleted after
//! that are recorded in a [`DeletionBitmap`] persisted next to the segment as
//! a generation-numbered deletion file (`seg_00000003_2.del`). Space is
//! reclaimed only when a merge drops the tombstoned documents.
//!
//! Deletion file layout (little-endian):
//!
//! ```text
//! magic "QDEL" u32 | version u32 | segment id u64 | doc count u32 | crc32 u32 | bitmap bytes (varint length prefixed)
//! ```

use bit_vec::BitVec;

use crate::error::{QuarryError, Result};
use crate::storage::structured::{StructReader, StructWriter};

/// Magic number of deletion files ("QDEL").
pub const DELETION_MAGIC: u32 = 0x5144_454C;

/// Current deletion file format version.
pub const DELETION_VERSION: u32 = 1;

/// Tombstones of one segment. Bit `i` set means document `i` is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionBitmap {
    bits: BitVec,
    deleted_count: u32,
}

impl DeletionBitmap {
    /// A bitmap for `doc_count` documents, none deleted.
    pub fn new(doc_count: u32) -> Self {
        DeletionBitmap {
            bits: BitVec::from_elem(doc_count as usize, false),
            deleted_count: 0,
        }
    }

    /// A bitmap over `bits.len()` documents, set bits deleted.
    pub fn from_bitvec(bits: BitVec) -> Self {
        let deleted_count = bits.iter().filter(|deleted| *deleted).count() as u32;
        DeletionBitmap {
            bits,
            deleted_count,
        }
    }

    /// Rebuild a bitmap from its packed bytes.
    pub fn from_bytes(doc_count: u32, bytes: &[u8]) -> Result<Self> {
        let expected = (doc_count as usize).div_ceil(8);
        if bytes.len() != expected {
            return Err(QuarryError::index(format!(
                "deletion bitmap has {} bytes, expected {expected} for {doc_count} documents",
                bytes.len()
            )));
        }
        let mut bits = BitVec::from_bytes(bytes);
        bits.truncate(doc_count as usize);
        Ok(Self::from_bitvec(bits))
    }

    /// Packed bytes, most significant bit first.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    /// Mark a document deleted. Returns `true` if it was live before.
    pub fn delete(&mut self, doc_id: u32) -> Result<bool> {
        match self.bits.get(doc_id as usize) {
            None => Err(QuarryError::index(format!(
                "document {doc_id} is out of range for a segment of {} documents",
                self.bits.len()
            ))),
            Some(true) => Ok(false),
            Some(false) => {
                self.bits.set(doc_id as usize, true);
                self.deleted_count += 1;
                Ok(true)
            }
        }
    }

    /// Mark every document deleted. Returns how many were live.
    pub fn delete_all(&mut self) -> u32 {
        let newly = self.live_count();
        for doc_id in 0..self.bits.len() {
            self.bits.set(doc_id, true);
        }
        self.deleted_count = self.doc_count();
        newly
    }

    /// Whether `doc_id` is deleted. Out-of-range ids count as deleted.
    pub fn is_deleted(&self, doc_id: u32) -> bool {
        self.bits.get(doc_id as usize).unwrap_or(true)
    }

    /// Add every tombstone of `other`. Both bitmaps must cover the same documents.
    pub fn union_with(&mut self, other: &DeletionBitmap) {
        debug_assert_eq!(self.bits.len(), other.bits.len());
        for doc_id in other.deleted_docs() {
            if doc_id < self.doc_count() && !self.is_deleted(doc_id) {
                self.bits.set(doc_id as usize, true);
                self.deleted_count += 1;
            }
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted_count
    }

    pub fn live_count(&self) -> u32 {
        self.doc_count() - self.deleted_count
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted_count > 0
    }

    /// Whether every document is deleted.
    pub fn is_fully_deleted(&self) -> bool {
        self.deleted_count == self.doc_count()
    }

    /// Fraction of documents deleted (0.0 for an empty segment).
    pub fn deletion_ratio(&self) -> f64 {
        if self.bits.is_empty() {
            0.0
        } else {
            self.deleted_count as f64 / self.bits.len() as f64
        }
    }

    /// Ids of deleted documents, ascending.
    pub fn deleted_docs(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, deleted)| *deleted)
            .map(|(doc_id, _)| doc_id as u32)
    }

    /// Ids of live documents, ascending.
    pub fn live_docs(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, deleted)| !*deleted)
            .map(|(doc_id, _)| doc_id as u32)
    }

    pub fn memory_usage(&self) -> usize {
        self.bits.capacity() / 8 + std::mem::size_of::<Self>()
    }
}

/// File name of a segment's deletion file at `generation`.
pub fn deletion_file_name(segment_id: u64, generation: u64) -> String {
    format!("seg_{segment_id:08}_{generation}.del")
}

/// Serialize a deletion file for `segment_id`.
pub fn encode_deletion_file(segment_id: u64, bitmap: &DeletionBitmap) -> Result<Vec<u8>> {
    let bytes = bitmap.to_bytes();
    let mut writer = StructWriter::with_capacity(bytes.len() + 32);
    writer.write_u32(DELETION_MAGIC)?;
    writer.write_u32(DELETION_VERSION)?;
    writer.write_u64(segment_id)?;
    writer.write_u32(bitmap.doc_count())?;
    writer.write_u32(crc32fast::hash(&bytes))?;
    writer.write_bytes(&bytes)?;
    Ok(writer.into_inner())
}

/// Parse and validate a deletion file. Every failure is a corruption error
/// naming `file_name`.
pub fn decode_deletion_file(
    file_name: &str,
    segment_id: u64,
    expected_docs: u32,
    data: &[u8],
) -> Result<DeletionBitmap> {
    let corrupt = |message: String| QuarryError::corrupt(file_name, message);

    let mut reader = StructReader::new(data);
    let magic = reader
        .read_u32()
        .map_err(|e| corrupt(format!("truncated header: {e}")))?;
    if magic != DELETION_MAGIC {
        return Err(corrupt(format!("bad magic {magic:#010x}")));
    }
    let version = reader
        .read_u32()
        .map_err(|e| corrupt(format!("truncated header: {e}")))?;
    if version != DELETION_VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }
    let (file_segment, doc_count, checksum) =
        read_header_tail(&mut reader).map_err(|e| corrupt(format!("truncated header: {e}")))?;
    if file_segment != segment_id {
        return Err(corrupt(format!(
            "belongs to segment {file_segment}, expected {segment_id}"
        )));
    }
    if doc_count != expected_docs {
        return Err(corrupt(format!(
            "covers {doc_count} documents, segment has {expected_docs}"
        )));
    }
    let bytes = reader
        .read_bytes()
        .map_err(|e| corrupt(format!("truncated bitmap: {e}")))?;
    if crc32fast::hash(bytes) != checksum {
        return Err(corrupt("checksum mismatch".to_string()));
    }
    DeletionBitmap::from_bytes(doc_count, bytes).map_err(|e| corrupt(e.to_string()))
}

fn read_header_tail(reader: &mut StructReader<'_>) -> Result<(u64, u32, u32)> {
    Ok((reader.read_u64()?, reader.read_u32()?, reader.read_u32()?))
}
