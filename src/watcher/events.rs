//! Filesystem change event types.

use std::path::{Path, PathBuf};

use crate::error::WatchError;

/// Kind of filesystem mutation, limited to the kinds that can affect
/// indexed content. Access and metadata-only changes are filtered out
/// before events reach this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A file or directory was created.
    Created,
    /// A file or directory was removed.
    Removed,
    /// A file or directory was renamed.
    Renamed,
    /// A file or directory was moved.
    Moved,
    /// File content was written.
    Written,
}

/// One filesystem mutation under the watched root.
///
/// Consumed once by the sync controller, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// The affected path.
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Create an event.
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A debounce window's worth of coalesced change events.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<ChangeEvent>,
}

impl EventBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event, dropping exact duplicates within the window.
    pub fn add(&mut self, event: ChangeEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    /// Drop every event whose path is under `prefix`.
    pub fn retain_outside(&mut self, prefix: &Path) {
        self.events.retain(|e| !e.path.starts_with(prefix));
    }

    /// Whether the batch holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of coalesced events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Iterate over the events.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter()
    }
}

/// Output of the change watcher: either a coalesced batch of events or a
/// watch-level error. Errors are a distinct signal, not change events, and
/// are non-fatal to the consumer.
#[derive(Debug)]
pub enum WatchSignal {
    /// Filesystem changes coalesced over one debounce window.
    Changes(EventBatch),
    /// The underlying watch reported an error.
    Error(WatchError),
}
