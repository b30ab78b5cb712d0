//! Inverted index: the active in-memory segment and immutable segment files.
//!
//! # Module Structure
//!
//! - `writer`: the active segment documents are added to
//! - `segment`: segment metadata, file codec, merge policy and merge engine

pub mod segment;
pub mod writer;

pub use segment::SegmentInfo;
pub use segment::reader::SegmentReader;
pub use writer::ActiveSegment;
