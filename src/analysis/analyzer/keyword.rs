//! Keyword analyzer: the whole input is a single token.

use std::any::Any;

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Emits the input unchanged as one token. Empty input yields no tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze<'a>(&self, text: &'a str) -> Result<TokenStream<'a>> {
        if text.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let token = Token::new(text, 0, 0, text.len());
        Ok(Box::new(std::iter::once(token)))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
