//! Text analysis module for Quarry.
//!
//! Turns raw field text into the normalized tokens that become index terms.
//!
//! ```text
//! Text → Analyzer → Token Stream (text, position, offsets)
//! ```
//!
//! # Examples
//!
//! ```
//! use quarry::analysis::analyzer::standard::StandardAnalyzer;
//! use quarry::analysis::analyzer::analyzer::Analyzer;
//!
//! let analyzer = StandardAnalyzer::new();
//! let tokens: Vec<_> = analyzer.analyze("Hello, World!").unwrap().map(|t| t.text).collect();
//! assert_eq!(tokens, vec!["hello", "world"]);
//! ```

pub mod analyzer;
pub mod token;

pub use analyzer::analyzer::Analyzer;
pub use analyzer::keyword::KeywordAnalyzer;
pub use analyzer::per_field::PerFieldAnalyzer;
pub use analyzer::standard::StandardAnalyzer;
pub use token::{Token, TokenStream};
