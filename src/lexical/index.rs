//! Index structures.

pub mod inverted;
