//! Index construction and querying.
//!
//! This module provides:
//! - Directory content loading into document sets
//! - Staged, generation-numbered index builds (tantivy backend)
//! - The atomically-published "current generation" handle
//! - Query execution against the committed generation

mod builder;
mod document;
mod generation;
mod loader;
mod query;

pub use builder::IndexBuilder;
pub use document::{Document, DocumentSet};
pub use generation::{open_current, Generation, SharedIndex};
pub use loader::ContentLoader;
pub use query::{QueryService, SearchHit};
