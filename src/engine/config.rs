//! Index configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::analysis::analyzer::per_field::PerFieldAnalyzer;
use crate::error::{QuarryError, Result};
use crate::lexical::index::inverted::segment::merge_policy::MergePolicy;

/// Configuration of an [`Index`](crate::engine::Index).
///
/// Scalar settings (de)serialize with serde; the analyzer does not and is
/// reset to the standard analyzer on deserialization.
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Analyzer used for tokenized fields, with per-field overrides.
    #[serde(skip)]
    pub analyzer: Arc<PerFieldAnalyzer>,

    /// Flush the active segment once it holds this many documents.
    #[serde(default = "default_flush_threshold_docs")]
    pub flush_threshold_docs: usize,

    /// Flush the active segment once its estimated size reaches this many bytes.
    #[serde(default = "default_flush_threshold_bytes")]
    pub flush_threshold_bytes: usize,

    /// Merge once the committed segment count exceeds this.
    #[serde(default = "default_merge_segment_count_threshold")]
    pub merge_segment_count_threshold: usize,

    /// Number of segments combined by one merge.
    #[serde(default = "default_merge_factor")]
    pub merge_factor: usize,

    /// Run merges on a background thread after commits.
    #[serde(default = "default_background_merge")]
    pub background_merge: bool,

    /// How long a writer waits for the write token.
    #[serde(default = "default_write_lock_timeout")]
    pub write_lock_timeout: Duration,
}

fn default_flush_threshold_docs() -> usize {
    10_000
}

fn default_flush_threshold_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_merge_segment_count_threshold() -> usize {
    8
}

fn default_merge_factor() -> usize {
    4
}

fn default_background_merge() -> bool {
    true
}

fn default_write_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            analyzer: Arc::new(PerFieldAnalyzer::default()),
            flush_threshold_docs: default_flush_threshold_docs(),
            flush_threshold_bytes: default_flush_threshold_bytes(),
            merge_segment_count_threshold: default_merge_segment_count_threshold(),
            merge_factor: default_merge_factor(),
            background_merge: default_background_merge(),
            write_lock_timeout: default_write_lock_timeout(),
        }
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("analyzer", &self.analyzer.name())
            .field("flush_threshold_docs", &self.flush_threshold_docs)
            .field("flush_threshold_bytes", &self.flush_threshold_bytes)
            .field(
                "merge_segment_count_threshold",
                &self.merge_segment_count_threshold,
            )
            .field("merge_factor", &self.merge_factor)
            .field("background_merge", &self.background_merge)
            .field("write_lock_timeout", &self.write_lock_timeout)
            .finish()
    }
}

impl IndexConfig {
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// The merge policy these settings describe.
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy::new(self.merge_segment_count_threshold, self.merge_factor)
    }

    /// Reject settings the index cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold_docs == 0 {
            return Err(QuarryError::input("flush_threshold_docs must be positive"));
        }
        if self.flush_threshold_bytes == 0 {
            return Err(QuarryError::input("flush_threshold_bytes must be positive"));
        }
        if self.merge_factor < 2 {
            return Err(QuarryError::input(format!(
                "merge_factor must be at least 2, got {}",
                self.merge_factor
            )));
        }
        Ok(())
    }
}

/// Builder for [`IndexConfig`].
#[derive(Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    /// Use `analyzer` for every field without an override.
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        let mut per_field = PerFieldAnalyzer::new(analyzer);
        per_field = self
            .config
            .analyzer
            .field_analyzers()
            .fold(per_field, |acc, (field, analyzer)| {
                acc.with_field(field, analyzer.clone())
            });
        self.config.analyzer = Arc::new(per_field);
        self
    }

    /// Use `analyzer` for `field`.
    pub fn field_analyzer(mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        let mut per_field = (*self.config.analyzer).clone();
        per_field.add_analyzer(field, analyzer);
        self.config.analyzer = Arc::new(per_field);
        self
    }

    /// Replace the whole per-field analyzer.
    pub fn per_field_analyzer(mut self, analyzer: PerFieldAnalyzer) -> Self {
        self.config.analyzer = Arc::new(analyzer);
        self
    }

    pub fn flush_threshold_docs(mut self, docs: usize) -> Self {
        self.config.flush_threshold_docs = docs;
        self
    }

    pub fn flush_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.flush_threshold_bytes = bytes;
        self
    }

    pub fn merge_segment_count_threshold(mut self, count: usize) -> Self {
        self.config.merge_segment_count_threshold = count;
        self
    }

    pub fn merge_factor(mut self, factor: usize) -> Self {
        self.config.merge_factor = factor;
        self
    }

    pub fn background_merge(mut self, enabled: bool) -> Self {
        self.config.background_merge = enabled;
        self
    }

    pub fn write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_lock_timeout = timeout;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
