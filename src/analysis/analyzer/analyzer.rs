//! The analyzer trait.

use std::any::Any;
use std::fmt::Debug;

use crate::analysis::token::TokenStream;
use crate::error::{QuarryError, Result};

/// Converts text into a stream of normalized tokens.
///
/// Implementations must be deterministic: analyzing the same input twice
/// yields identical token sequences. Positions may repeat or go backwards;
/// the indexer keeps each term's positions sorted.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze well-formed text.
    fn analyze<'a>(&self, text: &'a str) -> Result<TokenStream<'a>>;

    /// Analyze raw bytes, which must be valid UTF-8.
    fn analyze_bytes<'a>(&self, bytes: &'a [u8]) -> Result<TokenStream<'a>> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            QuarryError::input(format!(
                "text is not valid UTF-8 (first invalid byte at {})",
                e.valid_up_to()
            ))
        })?;
        self.analyze(text)
    }

    /// Name of this analyzer, for diagnostics.
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}
