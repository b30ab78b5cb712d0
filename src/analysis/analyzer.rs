//! Analyzers: the pluggable text-to-token step.

#[allow(clippy::module_inception)]
pub mod analyzer;
pub mod keyword;
pub mod per_field;
pub mod standard;
