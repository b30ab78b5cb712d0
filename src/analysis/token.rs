//! Token representation.

/// A single token produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Normalized token text; this is what gets indexed.
    pub text: String,

    /// Ordinal position in the token sequence, starting at 0.
    pub position: u32,

    /// Byte offset of the token start in the original text.
    pub start_offset: usize,

    /// Byte offset one past the token end in the original text.
    pub end_offset: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, position: u32, start_offset: usize, end_offset: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}

/// A lazy, finite sequence of tokens borrowed from the analyzed text.
pub type TokenStream<'a> = Box<dyn Iterator<Item = Token> + Send + 'a>;
