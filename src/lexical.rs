//! Lexical search: documents, the inverted index, queries and their evaluation.
//!
//! # Module Structure
//!
//! - `core`: documents, fields, terms and postings
//! - `index`: the active segment and immutable segment files
//! - `query`: query trees and the analyzing query builder
//! - `search`: evaluation, scoring and ranking

pub mod core;
pub mod index;
pub mod query;
pub mod search;

pub use core::document::{Document, DocumentBuilder, StoredDocument};
pub use core::field::{Field, FieldOption, FieldValue};
pub use core::term::Term;
pub use query::Query;
pub use query::builder::QueryBuilder;
