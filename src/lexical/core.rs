//! Core data types: documents, fields, terms and postings.

pub mod document;
pub mod field;
pub mod posting;
pub mod term;
