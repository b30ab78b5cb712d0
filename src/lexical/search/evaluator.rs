//! Query evaluation.
//!
//! A query is evaluated segment by segment into a list of `(doc, score)`
//! pairs sorted by document id. Boolean operators work on those sorted lists
//! (intersection, union, complement), tombstoned documents are removed, and
//! the per-segment results are merged into one ranking: descending score,
//! ties broken by ascending `(segment, doc)`.

use std::borrow::Cow;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::error::{QuarryError, Result};
use crate::lexical::core::posting::PostingList;
use crate::lexical::core::term::Term;
use crate::lexical::index::inverted::writer::ActiveSegment;
use crate::lexical::query::Query;
use crate::lexical::search::scorer::{BM25Scorer, CollectionStats};

/// A segment as seen by the evaluator.
pub trait SegmentSource: Send + Sync {
    /// Id used to order hits across segments.
    fn segment_id(&self) -> u64;

    /// Documents in the segment, deleted ones included.
    fn doc_count(&self) -> u32;

    fn is_deleted(&self, doc_id: u32) -> bool;

    /// Postings of `term`; empty when absent.
    fn postings(&self, term: &Term) -> Result<Cow<'_, PostingList>>;

    fn doc_frequency(&self, term: &Term) -> Result<u32>;

    fn field_length(&self, field: &str, doc_id: u32) -> u32;

    fn total_field_length(&self, field: &str) -> u64;
}

impl SegmentSource for ActiveSegment {
    fn segment_id(&self) -> u64 {
        ActiveSegment::segment_id(self)
    }

    fn doc_count(&self) -> u32 {
        ActiveSegment::doc_count(self)
    }

    fn is_deleted(&self, doc_id: u32) -> bool {
        ActiveSegment::is_deleted(self, doc_id)
    }

    fn postings(&self, term: &Term) -> Result<Cow<'_, PostingList>> {
        Ok(match ActiveSegment::postings(self, term) {
            Some(list) => Cow::Borrowed(list),
            None => Cow::Owned(PostingList::new()),
        })
    }

    fn doc_frequency(&self, term: &Term) -> Result<u32> {
        Ok(ActiveSegment::postings(self, term)
            .map(PostingList::doc_frequency)
            .unwrap_or(0))
    }

    fn field_length(&self, field: &str, doc_id: u32) -> u32 {
        ActiveSegment::field_length(self, field, doc_id)
    }

    fn total_field_length(&self, field: &str) -> u64 {
        ActiveSegment::total_field_length(self, field)
    }
}

/// Cooperative cancellation flag shared between a caller and a running query.
///
/// Cloning shares the flag. The evaluator checks it between segments.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A matching document of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u32,
    pub score: f32,
}

/// A ranked match across segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    pub segment_id: u64,
    pub doc_id: u32,
    pub score: f32,
}

/// Evaluates queries against single segments.
#[derive(Debug)]
pub struct Evaluator<'a> {
    stats: &'a CollectionStats,
    scorer: BM25Scorer,
}

impl<'a> Evaluator<'a> {
    pub fn new(stats: &'a CollectionStats, scorer: BM25Scorer) -> Self {
        Evaluator { stats, scorer }
    }

    /// Live matches of `query` in `source`, sorted by document id.
    pub fn evaluate(&self, query: &Query, source: &dyn SegmentSource) -> Result<Vec<ScoredDoc>> {
        let mut docs = self.eval(query, source)?;
        docs.retain(|doc| !source.is_deleted(doc.doc_id));
        Ok(docs)
    }

    fn eval(&self, query: &Query, source: &dyn SegmentSource) -> Result<Vec<ScoredDoc>> {
        match query {
            Query::Term(term) => self.term(term, source),
            Query::Phrase { field, terms } => self.phrase(field, terms, source),
            Query::And(children) => {
                let (negatives, positives): (Vec<&Query>, Vec<&Query>) =
                    children.iter().partition(|c| matches!(c, Query::Not(_)));
                let excluded = negatives
                    .iter()
                    .map(|q| match q {
                        Query::Not(inner) => self.eval(inner, source),
                        other => self.eval(other, source),
                    })
                    .try_fold(Vec::new(), |acc, docs| docs.map(|d| union(acc, d)))?;

                let mut positives = positives.into_iter();
                let included = match positives.next() {
                    None => return Ok(complement(&excluded, source.doc_count())),
                    Some(first) => {
                        let mut docs = self.eval(first, source)?;
                        for child in positives {
                            if docs.is_empty() {
                                break;
                            }
                            docs = intersect(&docs, &self.eval(child, source)?);
                        }
                        docs
                    }
                };
                Ok(subtract(included, &excluded))
            }
            Query::Or(children) => children
                .iter()
                .map(|child| self.eval(child, source))
                .try_fold(Vec::new(), |acc, docs| docs.map(|d| union(acc, d))),
            Query::Not(child) => {
                let matched = self.eval(child, source)?;
                Ok(complement(&matched, source.doc_count()))
            }
        }
    }

    fn term(&self, term: &Term, source: &dyn SegmentSource) -> Result<Vec<ScoredDoc>> {
        let postings = source.postings(term)?;
        let idf = self
            .scorer
            .idf(self.stats.doc_frequency(term), self.stats.doc_count());
        let avg = self.stats.avg_field_length(term.field());
        Ok(postings
            .iter()
            .map(|p| ScoredDoc {
                doc_id: p.doc_id,
                score: self.scorer.score(
                    p.frequency(),
                    source.field_length(term.field(), p.doc_id),
                    avg,
                    idf,
                ),
            })
            .collect())
    }

    fn phrase(
        &self,
        field: &str,
        words: &[String],
        source: &dyn SegmentSource,
    ) -> Result<Vec<ScoredDoc>> {
        let terms: Vec<Term> = words.iter().map(|w| Term::new(field, w.as_str())).collect();
        let lists = terms
            .iter()
            .map(|t| source.postings(t))
            .collect::<Result<Vec<_>>>()?;
        if lists.iter().any(|l| l.is_empty()) {
            return Ok(Vec::new());
        }
        let idfs: Vec<f32> = terms
            .iter()
            .map(|t| {
                self.scorer
                    .idf(self.stats.doc_frequency(t), self.stats.doc_count())
            })
            .collect();
        let avg = self.stats.avg_field_length(field);

        let mut docs = Vec::new();
        'docs: for first in lists[0].iter() {
            let mut others = Vec::with_capacity(lists.len() - 1);
            for list in &lists[1..] {
                match list.get(first.doc_id) {
                    Some(posting) => others.push(posting),
                    None => continue 'docs,
                }
            }

            let freq = first
                .positions
                .iter()
                .filter(|&&start| {
                    others.iter().enumerate().all(|(i, posting)| {
                        start
                            .checked_add(i as u32 + 1)
                            .is_some_and(|pos| posting.positions.binary_search(&pos).is_ok())
                    })
                })
                .count() as u32;
            if freq == 0 {
                continue;
            }

            let length = source.field_length(field, first.doc_id);
            let score = idfs
                .iter()
                .map(|&idf| self.scorer.score(freq, length, avg, idf))
                .sum();
            docs.push(ScoredDoc {
                doc_id: first.doc_id,
                score,
            });
        }
        Ok(docs)
    }
}

/// Documents in both lists; scores add up.
fn intersect(a: &[ScoredDoc], b: &[ScoredDoc]) -> Vec<ScoredDoc> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            CmpOrdering::Less => i += 1,
            CmpOrdering::Greater => j += 1,
            CmpOrdering::Equal => {
                out.push(ScoredDoc {
                    doc_id: a[i].doc_id,
                    score: a[i].score + b[j].score,
                });
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Documents in either list; scores of documents in both add up.
fn union(a: Vec<ScoredDoc>, b: Vec<ScoredDoc>) -> Vec<ScoredDoc> {
    if a.is_empty() {
        return b;
    }
    if b.is_empty() {
        return a;
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            CmpOrdering::Less => {
                out.push(a[i]);
                i += 1;
            }
            CmpOrdering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            CmpOrdering::Equal => {
                out.push(ScoredDoc {
                    doc_id: a[i].doc_id,
                    score: a[i].score + b[j].score,
                });
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Documents of `a` not in `excluded`.
fn subtract(mut a: Vec<ScoredDoc>, excluded: &[ScoredDoc]) -> Vec<ScoredDoc> {
    if excluded.is_empty() {
        return a;
    }
    let mut j = 0;
    a.retain(|doc| {
        while j < excluded.len() && excluded[j].doc_id < doc.doc_id {
            j += 1;
        }
        !(j < excluded.len() && excluded[j].doc_id == doc.doc_id)
    });
    a
}

/// Every document id below `doc_count` not in `matched`, with score 0.
fn complement(matched: &[ScoredDoc], doc_count: u32) -> Vec<ScoredDoc> {
    let mut out = Vec::with_capacity((doc_count as usize).saturating_sub(matched.len()));
    let mut j = 0;
    for doc_id in 0..doc_count {
        while j < matched.len() && matched[j].doc_id < doc_id {
            j += 1;
        }
        if j < matched.len() && matched[j].doc_id == doc_id {
            continue;
        }
        out.push(ScoredDoc { doc_id, score: 0.0 });
    }
    out
}

/// Rank order: descending score, then ascending `(segment, doc)`.
pub fn rank_order(a: &SegmentHit, b: &SegmentHit) -> CmpOrdering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.segment_id.cmp(&b.segment_id))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// Evaluate `query` over `sources` and return the top `limit` hits (all hits
/// when `limit` is `None`).
///
/// The query is validated first. Statistics are summed over all sources.
/// `cancel` is checked before each segment; once set, partial results are
/// discarded and `Cancelled` is returned.
pub fn search(
    query: &Query,
    sources: &[&dyn SegmentSource],
    limit: Option<usize>,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<SegmentHit>> {
    query.validate()?;
    if limit == Some(0) {
        return Ok(Vec::new());
    }

    let stats = CollectionStats::gather(sources, &query.terms())?;
    let evaluator = Evaluator::new(&stats, BM25Scorer::default());

    let mut hits = Vec::new();
    for source in sources {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(QuarryError::Cancelled);
        }
        hits.extend(
            evaluator
                .evaluate(query, *source)?
                .into_iter()
                .map(|doc| SegmentHit {
                    segment_id: source.segment_id(),
                    doc_id: doc.doc_id,
                    score: doc.score,
                }),
        );
    }
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(QuarryError::Cancelled);
    }

    let total = hits.len();
    hits.sort_by(rank_order);
    if let Some(limit) = limit {
        hits.truncate(limit);
    }
    debug!(
        "query {query} matched {total} documents in {} segments",
        sources.len()
    );
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::standard::StandardAnalyzer;
    use crate::lexical::core::document::Document;

    fn segment(id: u64, texts: &[&str]) -> ActiveSegment {
        let mut segment = ActiveSegment::new(id);
        for text in texts {
            segment
                .add_document(&Document::new().add_text("body", *text), &StandardAnalyzer::new())
                .unwrap();
        }
        segment
    }

    fn doc_ids(query: &Query, source: &ActiveSegment) -> Vec<u32> {
        search(query, &[source], None, None)
            .unwrap()
            .into_iter()
            .map(|hit| hit.doc_id)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_boolean_operators() {
        let seg = segment(0, &["red apple", "green apple", "red car", "blue car"]);

        assert_eq!(doc_ids(&Query::term("body", "apple"), &seg), vec![0, 1]);
        assert_eq!(
            doc_ids(
                &Query::and(vec![Query::term("body", "red"), Query::term("body", "apple")]),
                &seg
            ),
            vec![0]
        );
        assert_eq!(
            doc_ids(
                &Query::or(vec![Query::term("body", "green"), Query::term("body", "blue")]),
                &seg
            ),
            vec![1, 3]
        );
        assert_eq!(
            doc_ids(
                &Query::and(vec![
                    Query::term("body", "car"),
                    Query::not(Query::term("body", "red"))
                ]),
                &seg
            ),
            vec![3]
        );
        assert_eq!(doc_ids(&Query::not(Query::term("body", "car")), &seg), vec![0, 1]);
        assert_eq!(
            doc_ids(&Query::and(vec![Query::not(Query::term("body", "car"))]), &seg),
            vec![0, 1]
        );
        assert!(doc_ids(&Query::term("body", "missing"), &seg).is_empty());
    }

    #[test]
    fn test_phrase_requires_adjacency_and_order() {
        let seg = segment(0, &["kemp test", "test kemp", "kemp the test", "kemp test kemp test"]);
        assert_eq!(doc_ids(&Query::phrase("body", ["kemp", "test"]), &seg), vec![0, 3]);
        assert_eq!(doc_ids(&Query::phrase("body", ["kemp"]), &seg), vec![0, 1, 2, 3]);

        let hits = search(&Query::phrase("body", ["kemp", "test"]), &[&seg], None, None).unwrap();
        // Two occurrences outrank one despite the longer field.
        assert_eq!(hits[0].doc_id, 3);
    }

    #[test]
    fn test_deleted_documents_are_excluded() {
        let mut seg = segment(0, &["red apple", "red car"]);
        seg.delete(0);
        assert_eq!(doc_ids(&Query::term("body", "red"), &seg), vec![1]);
        assert_eq!(doc_ids(&Query::not(Query::term("body", "car")), &seg), Vec::<u32>::new());
    }

    #[test]
    fn test_ranking_and_limit() {
        let a = segment(1, &["apple", "apple apple pie"]);
        let b = segment(2, &["apple"]);
        let hits = search(&Query::term("body", "apple"), &[&a, &b], Some(2), None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);

        // Equal scores tie-break by segment then doc.
        let all = search(&Query::term("body", "apple"), &[&b, &a], None, None).unwrap();
        let ties: Vec<(u64, u32)> = all
            .iter()
            .filter(|h| h.score == all[all.len() - 1].score)
            .map(|h| (h.segment_id, h.doc_id))
            .collect();
        let mut sorted = ties.clone();
        sorted.sort();
        assert_eq!(ties, sorted);

        assert!(search(&Query::term("body", "apple"), &[&a], Some(0), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_query_and_cancellation() {
        let seg = segment(0, &["x"]);
        let err = search(&Query::or(vec![]), &[&seg], None, None).unwrap_err();
        assert!(matches!(err, QuarryError::QuerySyntax { .. }));

        let token = CancellationToken::new();
        token.cancel();
        let err = search(&Query::term("body", "x"), &[&seg], None, Some(&token)).unwrap_err();
        assert!(matches!(err, QuarryError::Cancelled));
    }
}
