//! stc-text
//!
//! Tantivy-backed local index engine: executes structured queries and
//! collectors against downloaded or locally built collections.

pub mod tantivy_utils;
pub mod index;
pub mod query;
pub mod search;

pub use index::CatalogIndexer;
pub use search::TantivyEngine;
