//! In-memory documents produced by a directory scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One indexed unit: a file path and its textual content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Canonical file path, used as the document identifier.
    pub path: PathBuf,
    /// Raw text content of the file.
    pub content: String,
}

impl Document {
    /// Create a document from a path and its content.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The complete set of documents produced by one scan.
///
/// One document per distinct path; inserting the same path again replaces
/// the earlier content. Owned by the scan until handed to the index builder.
#[derive(Debug, Default)]
pub struct DocumentSet {
    docs: BTreeMap<PathBuf, Document>,
}

impl DocumentSet {
    /// Create an empty document set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, replacing any earlier document for the same path.
    pub fn insert(&mut self, doc: Document) {
        self.docs.insert(doc.path.clone(), doc);
    }

    /// Whether a document exists for the given path.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.docs.contains_key(path)
    }

    /// Number of documents in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Iterate over the documents.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }
}

impl IntoIterator for DocumentSet {
    type Item = Document;
    type IntoIter = std::collections::btree_map::IntoValues<PathBuf, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_values()
    }
}
