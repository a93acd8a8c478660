//! Staged index builds.
//!
//! Every build goes into its own `gen-<n>` directory so a failure partway
//! through can never touch the committed generation. The commit itself
//! (pointer write + swap) belongs to [`SharedIndex`](super::SharedIndex).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tantivy::{doc, Index, IndexWriter};

use super::document::DocumentSet;
use super::generation::{build_schema, Generation, CONTENT_FIELD, PATH_FIELD, POINTER_FILE};
use crate::error::IndexError;

/// Memory budget handed to the tantivy writer per build.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Builds index generations in self-contained staging directories.
#[derive(Debug)]
pub struct IndexBuilder {
    index_dir: PathBuf,
    next_ordinal: AtomicU64,
}

impl IndexBuilder {
    /// Create a builder rooted at `index_dir`, sweeping stale state.
    ///
    /// Generation directories and the pointer file left behind by a
    /// previous run are deleted; the system always performs a full rebuild
    /// at startup.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Create`] if the storage location cannot be
    /// created or listed.
    pub fn new(index_dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let index_dir = index_dir.into();

        std::fs::create_dir_all(&index_dir)
            .map_err(|e| IndexError::create(index_dir.display().to_string(), e))?;
        sweep_stale(&index_dir)?;

        Ok(Self {
            index_dir,
            next_ordinal: AtomicU64::new(1),
        })
    }

    /// Build a fresh generation from one document set.
    ///
    /// Stages into `gen-<n>`, deleting any leftover directory of that name
    /// first. On failure the staging directory is discarded and the error
    /// returned; whatever generation is currently committed is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the staging store cannot be created or
    /// written.
    pub fn build(&self, docs: &DocumentSet) -> Result<Generation, IndexError> {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let dir = self.index_dir.join(format!("gen-{ordinal}"));

        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| IndexError::create(dir.display().to_string(), e))?;
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;

        match Self::stage(&dir, ordinal, docs) {
            Ok(generation) => {
                tracing::debug!(
                    ordinal,
                    documents = docs.len(),
                    dir = %dir.display(),
                    "Staged index generation"
                );
                Ok(generation)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %cleanup,
                        "Failed to discard staging directory"
                    );
                }
                Err(e)
            }
        }
    }

    fn stage(dir: &Path, ordinal: u64, docs: &DocumentSet) -> Result<Generation, IndexError> {
        let schema = build_schema();
        let index = Index::create_in_dir(dir, schema.clone())
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;

        let path_field = schema
            .get_field(PATH_FIELD)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;
        let content_field = schema
            .get_field(CONTENT_FIELD)
            .map_err(|e| IndexError::create(dir.display().to_string(), e))?;

        let mut writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(IndexError::write)?;

        for document in docs.iter() {
            writer
                .add_document(doc!(
                    path_field => document.path.display().to_string(),
                    content_field => document.content.clone(),
                ))
                .map_err(IndexError::write)?;
        }

        writer.commit().map_err(IndexError::write)?;
        drop(writer);

        Generation::from_parts(ordinal, dir.to_path_buf(), index)
    }
}

/// Remove generation directories and the pointer file from a previous run.
fn sweep_stale(index_dir: &Path) -> Result<(), IndexError> {
    let pointer = index_dir.join(POINTER_FILE);
    if pointer.exists() {
        if let Err(e) = std::fs::remove_file(&pointer) {
            tracing::warn!(path = %pointer.display(), error = %e, "Failed to remove stale pointer");
        }
    }

    let entries = std::fs::read_dir(index_dir)
        .map_err(|e| IndexError::create(index_dir.display().to_string(), e))?;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let is_generation = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("gen-"));

        if is_generation && path.is_dir() {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!(dir = %path.display(), "Swept stale generation"),
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "Failed to sweep stale generation");
                }
            }
        }
    }

    Ok(())
}
