//! # Quarry
//!
//! An embedded full-text search engine.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Segment-based persistence with atomic, crash-safe commits
//! - Pluggable analyzers per field
//! - Term, phrase and boolean queries ranked with BM25
//! - Snapshot-isolated readers alongside a single writer
//! - Background segment merging
//!
//! ```no_run
//! use quarry::{Document, Index, IndexConfig};
//!
//! # fn main() -> quarry::Result<()> {
//! let index = Index::open("/tmp/quarry-demo", IndexConfig::default())?;
//! index.add_document(Document::builder().add_text("title", "Hello Quarry").build())?;
//! index.commit()?;
//!
//! let query = index.query_builder().term("title", "hello")?;
//! for hit in index.query(&query, 10)? {
//!     println!("{} {:.3} {:?}", hit.address, hit.score, hit.document.get_text("title"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod engine;
mod error;
pub mod lexical;
pub mod maintenance;
pub mod storage;
mod util;

// Re-exports for the public API
pub use analysis::analyzer::analyzer::Analyzer;
pub use engine::Index;
pub use engine::config::{IndexConfig, IndexConfigBuilder};
pub use engine::search::{CancellationToken, DocAddress, IndexStats, SearchHit};
pub use error::{QuarryError, Result};
pub use lexical::{
    Document, DocumentBuilder, Field, FieldOption, FieldValue, Query, QueryBuilder,
    StoredDocument, Term,
};
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
