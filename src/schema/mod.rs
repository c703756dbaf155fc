//! Type schema definition language for the schema-backed converter.

mod elements;

pub use elements::*;
