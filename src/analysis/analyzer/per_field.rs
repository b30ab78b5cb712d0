//! Per-field analyzer selection.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::analysis::analyzer::standard::StandardAnalyzer;
use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Routes analysis to a field-specific analyzer, falling back to a default.
///
/// Used directly as an [`Analyzer`] it behaves like its default analyzer.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzer {
    default_analyzer: Arc<dyn Analyzer>,
    field_analyzers: AHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default_analyzer: Arc<dyn Analyzer>) -> Self {
        PerFieldAnalyzer {
            default_analyzer,
            field_analyzers: AHashMap::new(),
        }
    }

    /// Register an analyzer for one field.
    pub fn add_analyzer(&mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) {
        self.field_analyzers.insert(field.into(), analyzer);
    }

    /// Builder-style variant of [`add_analyzer`](Self::add_analyzer).
    pub fn with_field(mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        self.add_analyzer(field, analyzer);
        self
    }

    /// The analyzer used for `field`.
    pub fn analyzer_for(&self, field: &str) -> &Arc<dyn Analyzer> {
        self.field_analyzers
            .get(field)
            .unwrap_or(&self.default_analyzer)
    }

    pub fn default_analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.default_analyzer
    }

    /// Field overrides, in no particular order.
    pub fn field_analyzers(&self) -> impl Iterator<Item = (&str, &Arc<dyn Analyzer>)> {
        self.field_analyzers
            .iter()
            .map(|(field, analyzer)| (field.as_str(), analyzer))
    }

    /// Analyze `text` as a value of `field`.
    pub fn analyze_field<'a>(&self, field: &str, text: &'a str) -> Result<TokenStream<'a>> {
        self.analyzer_for(field).analyze(text)
    }
}

impl Default for PerFieldAnalyzer {
    fn default() -> Self {
        PerFieldAnalyzer::new(Arc::new(StandardAnalyzer::new()))
    }
}

impl Analyzer for PerFieldAnalyzer {
    fn analyze<'a>(&self, text: &'a str) -> Result<TokenStream<'a>> {
        self.default_analyzer.analyze(text)
    }

    fn name(&self) -> &'static str {
        "per_field"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
