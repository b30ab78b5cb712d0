//! Postings and posting lists.
//!
//! A [`PostingList`] holds, for one term, the documents containing it in
//! ascending document order, each with the ascending positions of the term
//! inside the field. The encoded form is delta-compressed varints:
//!
//! ```text
//! count
//! per posting: doc_delta, frequency, position deltas...
//! ```

use ahash::AHashMap;

use crate::error::{QuarryError, Result};
use crate::lexical::core::term::Term;
use crate::storage::structured::{StructReader, StructWriter};

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    /// Segment-local document id.
    pub doc_id: u32,

    /// Token positions, ascending.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: u32) -> Self {
        Posting {
            doc_id,
            positions: Vec::new(),
        }
    }

    /// A posting with the given positions, sorted and deduplicated.
    pub fn with_positions(doc_id: u32, mut positions: Vec<u32>) -> Self {
        positions.sort_unstable();
        positions.dedup();
        Posting { doc_id, positions }
    }

    /// Record `position`, keeping positions ascending and unique.
    fn add_position(&mut self, position: u32) {
        match self.positions.last() {
            Some(&last) if last >= position => {
                if let Err(idx) = self.positions.binary_search(&position) {
                    self.positions.insert(idx, position);
                }
            }
            _ => self.positions.push(position),
        }
    }

    /// Term frequency within the document.
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// The postings of one term, sorted by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList {
            postings: Vec::new(),
        }
    }

    /// Record an occurrence. Documents must arrive in non-decreasing id order;
    /// positions within a document may arrive in any order.
    pub fn add_occurrence(&mut self, doc_id: u32, position: u32) {
        match self.postings.last_mut() {
            Some(last) if last.doc_id == doc_id => last.add_position(position),
            _ => {
                debug_assert!(self.postings.last().is_none_or(|p| p.doc_id < doc_id));
                self.postings.push(Posting::with_positions(doc_id, vec![position]));
            }
        }
    }

    /// Append a whole posting. Its document id must be larger than the last one.
    pub fn push(&mut self, posting: Posting) {
        debug_assert!(self.postings.last().is_none_or(|p| p.doc_id < posting.doc_id));
        self.postings.push(posting);
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Drop the postings of documents at or above `doc_count`. Returns the
    /// number of positions removed.
    pub fn truncate_docs(&mut self, doc_count: u32) -> u64 {
        let keep = self.postings.partition_point(|p| p.doc_id < doc_count);
        self.postings
            .drain(keep..)
            .map(|p| p.frequency() as u64)
            .sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.postings.iter()
    }

    /// Posting of `doc_id`, if the term occurs in it.
    pub fn get(&self, doc_id: u32) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|idx| &self.postings[idx])
    }

    /// Number of documents containing the term.
    pub fn doc_frequency(&self) -> u32 {
        self.postings.len() as u32
    }

    /// Number of occurrences across all documents.
    pub fn total_frequency(&self) -> u64 {
        self.postings.iter().map(|p| p.frequency() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    /// Approximate heap footprint.
    pub fn heap_size(&self) -> usize {
        self.postings.capacity() * std::mem::size_of::<Posting>()
            + self
                .postings
                .iter()
                .map(|p| p.positions.capacity() * std::mem::size_of::<u32>())
                .sum::<usize>()
    }

    pub fn encode(&self, writer: &mut StructWriter) -> Result<()> {
        writer.write_varint(self.postings.len() as u64)?;
        let mut last_doc = 0u32;
        for posting in &self.postings {
            writer.write_varint((posting.doc_id - last_doc) as u64)?;
            writer.write_varint(posting.positions.len() as u64)?;
            let mut last_pos = 0u32;
            for &position in &posting.positions {
                let delta = position.checked_sub(last_pos).ok_or_else(|| {
                    QuarryError::index(format!(
                        "positions of doc {} are not ascending",
                        posting.doc_id
                    ))
                })?;
                writer.write_varint(delta as u64)?;
                last_pos = position;
            }
            last_doc = posting.doc_id;
        }
        Ok(())
    }

    pub fn decode(reader: &mut StructReader<'_>) -> Result<Self> {
        let count = reader.read_varint()? as usize;
        // Every posting takes at least two bytes.
        if count > reader.remaining() {
            return Err(QuarryError::index(format!(
                "posting count {count} exceeds remaining data"
            )));
        }
        let mut postings = Vec::with_capacity(count);
        let mut doc_id = 0u32;
        for idx in 0..count {
            let delta = to_u32(reader.read_varint()?)?;
            if idx > 0 && delta == 0 {
                return Err(QuarryError::index("posting doc ids are not increasing"));
            }
            doc_id = doc_id
                .checked_add(delta)
                .ok_or_else(|| QuarryError::index("posting doc id overflow"))?;
            let frequency = reader.read_varint()? as usize;
            if frequency > reader.remaining() {
                return Err(QuarryError::index(format!(
                    "term frequency {frequency} exceeds remaining data"
                )));
            }
            let mut positions = Vec::with_capacity(frequency);
            let mut position = 0u32;
            for _ in 0..frequency {
                position = position
                    .checked_add(to_u32(reader.read_varint()?)?)
                    .ok_or_else(|| QuarryError::index("position overflow"))?;
                positions.push(position);
            }
            postings.push(Posting::with_positions(doc_id, positions));
        }
        Ok(PostingList { postings })
    }
}

impl FromIterator<Posting> for PostingList {
    fn from_iter<I: IntoIterator<Item = Posting>>(iter: I) -> Self {
        let mut postings: Vec<Posting> = iter.into_iter().collect();
        postings.sort_by_key(|p| p.doc_id);
        PostingList { postings }
    }
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| QuarryError::index(format!("value {value} overflows u32")))
}

/// In-memory inverted index: term to posting list.
#[derive(Debug, Clone, Default)]
pub struct TermPostingIndex {
    terms: AHashMap<Term, PostingList>,
}

impl TermPostingIndex {
    pub fn new() -> Self {
        TermPostingIndex {
            terms: AHashMap::new(),
        }
    }

    /// Record an occurrence of `term` in `doc_id` at `position`.
    /// Returns `true` if the term was new.
    pub fn add_occurrence(&mut self, term: Term, doc_id: u32, position: u32) -> bool {
        let mut created = false;
        self.terms
            .entry(term)
            .or_insert_with(|| {
                created = true;
                PostingList::new()
            })
            .add_occurrence(doc_id, position);
        created
    }

    pub fn get(&self, term: &Term) -> Option<&PostingList> {
        self.terms.get(term)
    }

    /// All terms, in dictionary order.
    pub fn sorted_terms(&self) -> Vec<&Term> {
        let mut terms: Vec<&Term> = self.terms.keys().collect();
        terms.sort();
        terms
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Term, &PostingList)> {
        self.terms.iter()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }

    /// Drop every occurrence in documents at or above `doc_count`, and the
    /// terms left without postings. Returns `(terms removed, positions removed)`.
    pub fn truncate_docs(&mut self, doc_count: u32) -> (u64, u64) {
        let mut positions = 0;
        let before = self.terms.len();
        self.terms.retain(|_, list| {
            positions += list.truncate_docs(doc_count);
            !list.is_empty()
        });
        ((before - self.terms.len()) as u64, positions)
    }
}
