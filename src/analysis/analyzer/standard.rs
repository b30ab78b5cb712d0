//! Standard analyzer: split on non-alphanumeric boundaries, normalize, lowercase.

use std::any::Any;

use unicode_normalization::UnicodeNormalization;

use crate::analysis::analyzer::analyzer::Analyzer;
use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// The default analyzer.
///
/// A token is a maximal run of alphanumeric characters (Unicode-aware, so
/// CJK runs and digits count). Each token is NFKC-normalized and lowercased.
/// Offsets refer to the original text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze<'a>(&self, text: &'a str) -> Result<TokenStream<'a>> {
        Ok(Box::new(StandardTokenStream::new(text)))
    }

    fn name(&self) -> &'static str {
        "standard"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lazy token iterator behind [`StandardAnalyzer`].
#[derive(Debug, Clone)]
pub struct StandardTokenStream<'a> {
    text: &'a str,
    offset: usize,
    position: u32,
}

impl<'a> StandardTokenStream<'a> {
    pub fn new(text: &'a str) -> Self {
        StandardTokenStream {
            text,
            offset: 0,
            position: 0,
        }
    }
}

impl Iterator for StandardTokenStream<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let rest = &self.text[self.offset..];
        let Some((skip, _)) = rest.char_indices().find(|(_, c)| c.is_alphanumeric()) else {
            self.offset = self.text.len();
            return None;
        };

        let start = self.offset + skip;
        let end = self.text[start..]
            .char_indices()
            .find(|(_, c)| !c.is_alphanumeric())
            .map(|(i, _)| start + i)
            .unwrap_or(self.text.len());
        self.offset = end;

        let normalized: String = self.text[start..end]
            .nfkc()
            .flat_map(char::to_lowercase)
            .collect();

        let token = Token::new(normalized, self.position, start, end);
        self.position += 1;
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        StandardAnalyzer::new()
            .analyze(input)
            .unwrap()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_split_and_lowercase() {
        assert_eq!(texts("Kemp test"), vec!["kemp", "test"]);
        assert_eq!(texts("  Hello,World!! rust-lang 2024 "), vec![
            "hello", "world", "rust", "lang", "2024"
        ]);
    }

    #[test]
    fn test_positions_and_offsets() {
        let tokens: Vec<Token> = StandardAnalyzer::new().analyze("a, Bc").unwrap().collect();
        assert_eq!(tokens, vec![Token::new("a", 0, 0, 1), Token::new("bc", 1, 3, 5)]);
    }

    #[test]
    fn test_unicode_runs() {
        assert_eq!(texts("Kemp 测试"), vec!["kemp", "测试"]);
        assert_eq!(texts("ＡＢＣ"), vec!["abc"]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(texts("").is_empty());
        assert!(texts("... --- !!!").is_empty());
    }

    #[test]
    fn test_restartable() {
        let analyzer = StandardAnalyzer::new();
        let first: Vec<Token> = analyzer.analyze("one two two").unwrap().collect();
        let second: Vec<Token> = analyzer.analyze("one two two").unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_utf8_is_input_error() {
        let analyzer = StandardAnalyzer::new();
        let err = analyzer.analyze_bytes(&[0x66, 0x6f, 0xff]).err().unwrap();
        assert!(matches!(err, crate::error::QuarryError::Input { .. }));
        assert_eq!(analyzer.analyze_bytes(b"ok go").unwrap().count(), 2);
    }
}
