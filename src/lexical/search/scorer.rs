//! BM25 scoring and the collection statistics it needs.

use ahash::AHashMap;

use crate::error::Result;
use crate::lexical::core::term::Term;
use crate::lexical::search::evaluator::SegmentSource;

/// Okapi BM25.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BM25Scorer {
    /// Term frequency saturation.
    pub k1: f32,
    /// Length normalization.
    pub b: f32,
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl BM25Scorer {
    pub fn new(k1: f32, b: f32) -> Self {
        BM25Scorer { k1, b }
    }

    /// Inverse document frequency. Always positive.
    pub fn idf(&self, doc_freq: u64, doc_count: u64) -> f32 {
        let n = doc_count.max(doc_freq) as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score of one term occurring `freq` times in a field of
    /// `field_length` tokens.
    pub fn score(&self, freq: u32, field_length: u32, avg_field_length: f32, idf: f32) -> f32 {
        if freq == 0 {
            return 0.0;
        }
        let tf = freq as f32;
        let avg = if avg_field_length > 0.0 {
            avg_field_length
        } else {
            1.0
        };
        let norm = self.k1 * (1.0 - self.b + self.b * field_length as f32 / avg);
        idf * tf * (self.k1 + 1.0) / (tf + norm)
    }
}

/// Term and field statistics summed over the segments a query runs on.
///
/// Document counts include deleted documents until a merge drops them.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    doc_count: u64,
    doc_freqs: AHashMap<Term, u64>,
    field_lengths: AHashMap<String, u64>,
}

impl CollectionStats {
    /// Gather statistics for `terms` over `sources`.
    pub fn gather(sources: &[&dyn SegmentSource], terms: &[Term]) -> Result<Self> {
        let mut stats = CollectionStats::default();
        for source in sources {
            stats.doc_count += source.doc_count() as u64;
            for term in terms {
                let df = source.doc_frequency(term)? as u64;
                *stats.doc_freqs.entry(term.clone()).or_insert(0) += df;
                if !stats.field_lengths.contains_key(term.field()) {
                    stats.field_lengths.insert(term.field().to_string(), 0);
                }
            }
        }
        let fields: Vec<String> = stats.field_lengths.keys().cloned().collect();
        for field in fields {
            let total = sources.iter().map(|s| s.total_field_length(&field)).sum();
            stats.field_lengths.insert(field, total);
        }
        Ok(stats)
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn doc_frequency(&self, term: &Term) -> u64 {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    /// Average token count of `field` per document.
    pub fn avg_field_length(&self, field: &str) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.field_lengths.get(field).copied().unwrap_or(0) as f32 / self.doc_count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_prefers_rare_terms() {
        let scorer = BM25Scorer::default();
        assert!(scorer.idf(1, 100) > scorer.idf(50, 100));
        assert!(scorer.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_score_saturates_and_normalizes() {
        let scorer = BM25Scorer::default();
        let idf = scorer.idf(1, 10);
        let one = scorer.score(1, 10, 10.0, idf);
        let two = scorer.score(2, 10, 10.0, idf);
        let many = scorer.score(50, 10, 10.0, idf);
        assert!(two > one);
        assert!(many < idf * (scorer.k1 + 1.0));

        let short = scorer.score(1, 2, 10.0, idf);
        assert!(short > one);
        assert_eq!(scorer.score(0, 2, 10.0, idf), 0.0);
    }
}
