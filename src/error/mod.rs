//! Error types and Result aliases for findex.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using findex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for findex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Directory scan error.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// Index build or query error.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// File watching error.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while scanning the watched directory tree.
///
/// A scan either produces a complete document set or fails with the first
/// path it could not handle. There are no partial results.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Traversal of the root failed.
    #[error("cannot traverse '{path}': {reason}")]
    Walk { path: String, reason: String },

    /// A file under the root could not be read.
    #[error("cannot read '{path}': {reason}")]
    Read { path: String, reason: String },
}

/// Errors raised by the index backend during builds and queries.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The backing store for a new generation could not be created.
    #[error("cannot create index at '{location}': {reason}")]
    Create { location: String, reason: String },

    /// Adding documents or committing the writer failed.
    #[error("cannot write index: {reason}")]
    Write { reason: String },

    /// Query parsing or execution failed.
    #[error("query failed: {reason}")]
    Query { reason: String },

    /// No index generation has ever been committed.
    #[error("no index built yet")]
    NotReady,
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Failed to register or re-register the watch.
    #[error("failed to watch '{path}': {reason}")]
    Subscribe { path: String, reason: String },

    /// The underlying event stream reported an error.
    #[error("watch stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl ScanError {
    /// Create a traversal error for a path.
    pub fn walk(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Walk {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a read error for a path.
    pub fn read(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl IndexError {
    /// Create an index creation error.
    pub fn create(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Create {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an index write error.
    pub fn write(reason: impl ToString) -> Self {
        Self::Write {
            reason: reason.to_string(),
        }
    }

    /// Create a query error.
    pub fn query(reason: impl ToString) -> Self {
        Self::Query {
            reason: reason.to_string(),
        }
    }
}

impl WatchError {
    /// Create a subscription error for a path.
    pub fn subscribe(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Subscribe {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
