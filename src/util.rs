//! Shared utility modules used across Quarry components.

pub mod varint;
