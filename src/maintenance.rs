//! Index maintenance: logical deletion of documents.

pub mod deletion;
