//! Building queries from raw text.
//!
//! Term and phrase queries match analyzed terms. [`QueryBuilder`] runs raw
//! text through the same per-field analyzer the index uses, so
//! `phrase("name", "Kemp test")` matches a document indexed with
//! `name: "Kemp test"`.
//!
//! Untokenized fields (`Field::string`, numbers) are indexed as one exact
//! term and never pass through the analyzer. Query them with
//! [`QueryBuilder::exact`], or register a keyword analyzer for the field.

use std::sync::Arc;

use crate::analysis::analyzer::per_field::PerFieldAnalyzer;
use crate::error::{QuarryError, Result};
use crate::lexical::core::term::Term;
use crate::lexical::query::Query;

/// Creates term and phrase queries through an analyzer.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    analyzer: Arc<PerFieldAnalyzer>,
}

impl QueryBuilder {
    pub fn new(analyzer: Arc<PerFieldAnalyzer>) -> Self {
        QueryBuilder { analyzer }
    }

    fn tokens(&self, field: &str, text: &str) -> Result<Vec<String>> {
        Ok(self
            .analyzer
            .analyze_field(field, text)?
            .map(|token| token.text)
            .collect())
    }

    fn no_tokens(field: &str, text: &str) -> QuarryError {
        QuarryError::query_syntax(format!(
            "text {text:?} produces no terms for field '{field}'"
        ))
    }

    /// Term query for `text`. Text analyzing to several tokens becomes an
    /// `Or` of their term queries.
    ///
    /// `text` goes through the field's analyzer, so `term("id", "ABC-1")`
    /// does not match `Field::string("id", "ABC-1")` unless `id` has a keyword
    /// analyzer. Use [`QueryBuilder::exact`] for untokenized fields.
    pub fn term(&self, field: &str, text: &str) -> Result<Query> {
        let mut tokens = self.tokens(field, text)?;
        match tokens.len() {
            0 => Err(Self::no_tokens(field, text)),
            1 => Ok(Query::term(field, tokens.remove(0))),
            _ => Ok(Query::or(
                tokens.into_iter().map(|t| Query::term(field, t)).collect(),
            )),
        }
    }

    /// Phrase query over the tokens of `text`, analyzed like [`QueryBuilder::term`].
    pub fn phrase(&self, field: &str, text: &str) -> Result<Query> {
        let tokens = self.tokens(field, text)?;
        if tokens.is_empty() {
            return Err(Self::no_tokens(field, text));
        }
        Ok(Query::phrase(field, tokens))
    }

    /// Phrase query from separately given words, each analyzed in turn.
    pub fn phrase_terms(&self, field: &str, words: &[&str]) -> Result<Query> {
        let mut tokens = Vec::new();
        for word in words {
            tokens.extend(self.tokens(field, word)?);
        }
        if tokens.is_empty() {
            return Err(Self::no_tokens(field, &words.join(" ")));
        }
        Ok(Query::phrase(field, tokens))
    }

    /// Conjunction of term queries, one per token of `text`.
    pub fn all_terms(&self, field: &str, text: &str) -> Result<Query> {
        let tokens = self.tokens(field, text)?;
        if tokens.is_empty() {
            return Err(Self::no_tokens(field, text));
        }
        Ok(Query::and(
            tokens.into_iter().map(|t| Query::term(field, t)).collect(),
        ))
    }

    /// Exact term, bypassing the analyzer. Use for untokenized and numeric fields.
    pub fn exact(&self, field: &str, value: impl ToString) -> Query {
        Query::Term(Term::new(field, value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::keyword::KeywordAnalyzer;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(Arc::new(
            PerFieldAnalyzer::default().with_field("id", Arc::new(KeywordAnalyzer::new())),
        ))
    }

    #[test]
    fn test_phrase_is_analyzed() {
        let builder = builder();
        assert_eq!(
            builder.phrase("name", "Kemp test").unwrap(),
            Query::phrase("name", ["kemp", "test"])
        );
        assert_eq!(
            builder.phrase_terms("name", &["Kemp", "test"]).unwrap(),
            Query::phrase("name", ["kemp", "test"])
        );
    }

    #[test]
    fn test_term_uses_field_analyzer() {
        let builder = builder();
        assert_eq!(builder.term("id", "AB-1").unwrap(), Query::term("id", "AB-1"));
        assert_eq!(
            builder.term("body", "AB-1").unwrap(),
            Query::or(vec![Query::term("body", "ab"), Query::term("body", "1")])
        );
        assert_eq!(builder.exact("age", 26), Query::term("age", "26"));
    }

    #[test]
    fn test_untokenized_fields_need_exact() {
        let builder = builder();
        assert_ne!(builder.term("sku", "ABC-1").unwrap(), Query::term("sku", "ABC-1"));
        assert_eq!(builder.exact("sku", "ABC-1"), Query::term("sku", "ABC-1"));
    }

    #[test]
    fn test_text_without_tokens_is_rejected() {
        let err = builder().phrase("name", " ,; ").unwrap_err();
        assert!(matches!(err, QuarryError::QuerySyntax { .. }));
    }
}
