//! Directory content loading for index builds.
//!
//! Walks the watched root and reads every file into an in-memory
//! document set. A scan is all-or-nothing: the first unreadable entry
//! aborts it so the caller never indexes a partial tree.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::document::{Document, DocumentSet};
use crate::error::ScanError;

/// Loads the contents of a directory tree into a [`DocumentSet`].
#[derive(Debug, Clone)]
pub struct ContentLoader {
    root: PathBuf,
    exclude: Option<PathBuf>,
}

impl ContentLoader {
    /// Create a loader for the given root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: None,
        }
    }

    /// Exclude one subtree from scans.
    ///
    /// Used when the index storage directory lives under the watched root,
    /// so index files are never indexed as documents.
    #[must_use]
    pub fn with_exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude = Some(path.into());
        self
    }

    /// The root directory this loader scans.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and read every non-directory entry as text.
    ///
    /// File bytes are converted with lossy UTF-8 so binary content never
    /// fails a scan; it simply indexes as replacement characters.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] naming the offending path if the root cannot
    /// be traversed or any file cannot be read. No partial document sets
    /// are produced.
    pub fn scan(&self) -> Result<DocumentSet, ScanError> {
        let mut docs = DocumentSet::new();

        let mut walker = WalkDir::new(&self.root).into_iter();
        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.display().to_string(), |p| {
                            p.display().to_string()
                        });
                    return Err(ScanError::walk(path, e));
                }
            };

            let path = entry.path();

            if let Some(ref exclude) = self.exclude {
                if path.starts_with(exclude) {
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }

            if entry.file_type().is_dir() {
                continue;
            }

            let bytes = std::fs::read(path)
                .map_err(|e| ScanError::read(path.display().to_string(), e))?;
            let content = String::from_utf8_lossy(&bytes).into_owned();

            docs.insert(Document::new(path, content));
        }

        tracing::debug!(
            root = %self.root.display(),
            documents = docs.len(),
            "Directory scan complete"
        );

        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_reads_all_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello world").unwrap();

        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.txt"), "goodbye world").unwrap();

        let docs = ContentLoader::new(tmp.path()).scan().unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs.contains(&tmp.path().join("a.txt")));
        assert!(docs.contains(&sub.join("b.txt")));

        let a = docs
            .iter()
            .find(|d| d.path.ends_with("a.txt"))
            .unwrap();
        assert_eq!(a.content, "hello world");
    }

    #[test]
    fn test_scan_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let docs = ContentLoader::new(tmp.path()).scan().unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("does-not-exist");

        let err = ContentLoader::new(&missing).scan().unwrap_err();
        assert!(matches!(err, ScanError::Walk { .. }));
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_scan_binary_content_is_lossy() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blob.bin"), [0xff, 0xfe, b'o', b'k']).unwrap();

        let docs = ContentLoader::new(tmp.path()).scan().unwrap();
        let doc = docs.iter().next().unwrap();
        assert!(doc.content.contains("ok"));
    }

    #[test]
    fn test_scan_excludes_subtree() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "keep").unwrap();

        let index_dir = tmp.path().join(".findex");
        fs::create_dir(&index_dir).unwrap();
        fs::write(index_dir.join("segment"), "skip").unwrap();

        let docs = ContentLoader::new(tmp.path())
            .with_exclude(&index_dir)
            .scan()
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert!(docs.contains(&tmp.path().join("a.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_unreadable_file_aborts() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ok.txt"), "fine").unwrap();

        let locked = tmp.path().join("locked.txt");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Running as root bypasses permission bits; skip there.
        if fs::read(&locked).is_ok() {
            return;
        }

        let err = ContentLoader::new(tmp.path()).scan().unwrap_err();
        assert!(matches!(err, ScanError::Read { .. }));
        assert!(err.to_string().contains("locked.txt"));
    }
}
