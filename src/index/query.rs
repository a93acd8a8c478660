//! Query execution against the current generation.

use std::sync::Arc;

use serde::Serialize;

use super::generation::SharedIndex;
use crate::error::IndexError;

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Path of the matching document.
    pub path: String,
    /// Relevance score assigned by the index backend.
    pub score: f32,
}

/// Serves queries against whatever generation is currently committed.
///
/// Mid-rebuild the previous generation keeps answering transparently; a
/// query holds its snapshot for its whole execution, so a commit landing
/// while it runs never mixes results.
#[derive(Debug, Clone)]
pub struct QueryService {
    shared: Arc<SharedIndex>,
    limit: usize,
}

impl QueryService {
    /// Create a query service over the shared generation handle.
    #[must_use]
    pub fn new(shared: Arc<SharedIndex>, limit: usize) -> Self {
        Self { shared, limit }
    }

    /// Execute a query and return ranked `(path, score)` hits.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotReady`] if no generation has ever been
    /// committed, or [`IndexError::Query`] if the query itself fails.
    pub fn search(&self, text: &str) -> Result<Vec<SearchHit>, IndexError> {
        let generation = self.shared.load().ok_or(IndexError::NotReady)?;
        generation.search(text, self.limit)
    }
}
