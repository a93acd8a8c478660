//! Filesystem change watching.
//!
//! This module provides:
//! - Recursive directory watching using notify-rs
//! - Event-kind filtering (content mutations only)
//! - Debounce coalescing of event bursts into batches

mod events;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{ChangeEvent, ChangeKind, EventBatch, WatchSignal};
pub use watcher::ChangeWatcher;
