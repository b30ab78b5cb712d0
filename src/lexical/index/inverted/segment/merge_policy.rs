//! Merge policy: which committed segments to combine, and when.
//!
//! The policy is count based. Once the number of committed segments exceeds
//! the threshold, the `merge_factor` smallest segments (by live documents)
//! are merged into one. A forced merge reduces the index to at most a given
//! number of segments.

use serde::{Deserialize, Serialize};

use crate::lexical::index::inverted::segment::SegmentInfo;

/// Merge policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Merge once the committed segment count exceeds this.
    pub segment_count_threshold: usize,

    /// Number of segments combined by one merge.
    pub merge_factor: usize,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            segment_count_threshold: 8,
            merge_factor: 4,
        }
    }
}

/// Reason why segments should be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many committed segments.
    SegmentCount,
    /// Explicitly requested.
    Forced,
}

/// A selected merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCandidate {
    /// Segment ids to merge, in commit order.
    pub segment_ids: Vec<u64>,
    /// Live documents the merged segment will hold.
    pub live_docs: u64,
    pub reason: MergeReason,
}

impl MergePolicy {
    pub fn new(segment_count_threshold: usize, merge_factor: usize) -> Self {
        MergePolicy {
            segment_count_threshold,
            merge_factor,
        }
    }

    /// Whether `segments` warrant a merge.
    pub fn needs_merge(&self, segments: &[SegmentInfo]) -> bool {
        segments.len() > self.segment_count_threshold
    }

    /// Pick the segments of the next merge, if one is due.
    pub fn select(&self, segments: &[SegmentInfo]) -> Option<MergeCandidate> {
        if !self.needs_merge(segments) {
            return None;
        }
        let count = self.merge_factor.max(2).min(segments.len());
        Some(Self::smallest(segments, count, MergeReason::SegmentCount))
    }

    /// Pick the segments that reduce the index to at most `max_segments`.
    ///
    /// With a single remaining segment that has deletions and
    /// `max_segments == 1`, that segment alone is selected so the merge
    /// expunges its deleted documents.
    pub fn select_forced(
        &self,
        segments: &[SegmentInfo],
        max_segments: usize,
    ) -> Option<MergeCandidate> {
        let max_segments = max_segments.max(1);
        if segments.len() > max_segments {
            let count = segments.len() - max_segments + 1;
            return Some(Self::smallest(segments, count, MergeReason::Forced));
        }
        match segments {
            [only] if only.deleted_count > 0 => {
                Some(Self::smallest(segments, 1, MergeReason::Forced))
            }
            _ => None,
        }
    }

    fn smallest(segments: &[SegmentInfo], count: usize, reason: MergeReason) -> MergeCandidate {
        let mut by_size: Vec<&SegmentInfo> = segments.iter().collect();
        by_size.sort_by_key(|s| (s.live_count(), s.segment_id));
        let mut chosen: Vec<&SegmentInfo> = by_size.into_iter().take(count).collect();
        chosen.sort_by_key(|s| s.segment_id);

        MergeCandidate {
            live_docs: chosen.iter().map(|s| s.live_count() as u64).sum(),
            segment_ids: chosen.into_iter().map(|s| s.segment_id).collect(),
            reason,
        }
    }
}
