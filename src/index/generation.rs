//! Index generations and the published "current generation" handle.
//!
//! A generation is one immutable, fully-committed index snapshot living in
//! its own `gen-<n>` directory. Readers always work against the generation
//! they loaded; committing a newer one never disturbs queries in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};

use super::query::SearchHit;
use crate::error::IndexError;

/// Field holding the document identifier (file path).
pub(crate) const PATH_FIELD: &str = "path";

/// Field holding the indexed file content.
pub(crate) const CONTENT_FIELD: &str = "content";

/// Name of the pointer file marking the committed generation.
pub(crate) const POINTER_FILE: &str = "CURRENT";

/// Build the index schema shared by all generations.
pub(crate) fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(PATH_FIELD, STRING | STORED);
    builder.add_text_field(CONTENT_FIELD, TEXT);
    builder.build()
}

/// One immutable, queryable index snapshot.
pub struct Generation {
    ordinal: u64,
    dir: PathBuf,
    index: Index,
    reader: IndexReader,
    path_field: Field,
    content_field: Field,
    retired: AtomicBool,
}

impl Generation {
    /// Wrap a freshly committed index living in `dir`.
    pub(crate) fn from_parts(ordinal: u64, dir: PathBuf, index: Index) -> Result<Self, IndexError> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;

        let schema = index.schema();
        let path_field = schema
            .get_field(PATH_FIELD)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;
        let content_field = schema
            .get_field(CONTENT_FIELD)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;

        Ok(Self {
            ordinal,
            dir,
            index,
            reader,
            path_field,
            content_field,
            retired: AtomicBool::new(false),
        })
    }

    /// Open a previously committed generation directory.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the directory does not hold a readable
    /// index.
    pub fn open(dir: impl Into<PathBuf>, ordinal: u64) -> Result<Self, IndexError> {
        let dir = dir.into();
        let index = Index::open_in_dir(&dir)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;
        Self::from_parts(ordinal, dir, index)
    }

    /// Commit ordinal of this generation. Later commits have higher ordinals.
    #[must_use]
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Directory holding this generation's index files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Execute a query against this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the query cannot be parsed or
    /// executed.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let query = parser.parse_query(text).map_err(IndexError::query)?;

        let top = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(IndexError::query)?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address).map_err(IndexError::query)?;
            let path = doc
                .get_first(self.path_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            hits.push(SearchHit { path, score });
        }

        Ok(hits)
    }

    /// Mark this generation as superseded.
    ///
    /// Its directory is removed once the last reference drops, so storage
    /// is released only after every in-flight query against it completes.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        if !self.retired.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove superseded generation"
            );
        } else {
            tracing::debug!(
                dir = %self.dir.display(),
                ordinal = self.ordinal,
                "Removed superseded generation"
            );
        }
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("ordinal", &self.ordinal)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// The single shared "current generation" reference.
///
/// Mutated only by [`SharedIndex::publish`]; readers clone the `Arc` under
/// a read lock and never observe a half-committed index.
#[derive(Debug)]
pub struct SharedIndex {
    index_dir: PathBuf,
    current: RwLock<Option<Arc<Generation>>>,
}

impl SharedIndex {
    /// Create a handle with no committed generation.
    #[must_use]
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            current: RwLock::new(None),
        }
    }

    /// Load the currently committed generation, if any.
    #[must_use]
    pub fn load(&self) -> Option<Arc<Generation>> {
        self.current.read().clone()
    }

    /// Atomically commit a staged generation as the current one.
    ///
    /// Writes the on-disk pointer first (write-then-rename), then swaps the
    /// in-memory reference. The superseded generation is retired; its
    /// storage goes away when its last reader drops it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Write`] if the pointer file cannot be written.
    /// The staged generation is discarded in that case and the previous
    /// generation stays current.
    pub fn publish(&self, generation: Generation) -> Result<Arc<Generation>, IndexError> {
        self.write_pointer(&generation)?;

        let fresh = Arc::new(generation);
        let old = {
            let mut current = self.current.write();
            current.replace(Arc::clone(&fresh))
        };

        if let Some(old) = old {
            old.retire();
        }

        Ok(fresh)
    }

    fn write_pointer(&self, generation: &Generation) -> Result<(), IndexError> {
        let name = generation
            .dir()
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IndexError::write("generation directory has no name"))?;

        let tmp = self.index_dir.join(format!("{POINTER_FILE}.tmp"));
        std::fs::write(&tmp, name).map_err(IndexError::write)?;
        std::fs::rename(&tmp, self.index_dir.join(POINTER_FILE)).map_err(IndexError::write)?;
        Ok(())
    }
}

/// Open the generation named by the on-disk pointer file.
///
/// Used by the one-shot query frontend, which runs outside the daemon
/// process and reads whatever generation was committed last.
///
/// # Errors
///
/// Returns [`IndexError::NotReady`] if no generation has ever been
/// committed, or another [`IndexError`] if the pointed-at index cannot be
/// opened.
pub fn open_current(index_dir: &Path) -> Result<Generation, IndexError> {
    let pointer = index_dir.join(POINTER_FILE);
    let name = std::fs::read_to_string(&pointer).map_err(|_| IndexError::NotReady)?;
    let name = name.trim();

    let ordinal = name
        .strip_prefix("gen-")
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| IndexError::query(format!("corrupt generation pointer '{name}'")))?;

    Generation::open(index_dir.join(name), ordinal)
}
