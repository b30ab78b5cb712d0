//! Search execution: per-segment evaluation, BM25 scoring and ranking.

pub mod evaluator;
pub mod scorer;

pub use evaluator::{CancellationToken, Evaluator, ScoredDoc, SegmentHit, SegmentSource, search};
pub use scorer::{BM25Scorer, CollectionStats};
