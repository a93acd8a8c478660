//! Index synchronization.
//!
//! Ties the watcher, loader, and builder together: an initial full build,
//! then serialized full rebuilds in response to filesystem changes, with
//! the committed generation always available to queries.

mod controller;

pub use controller::{SyncController, SyncHandle, SyncState, SyncStats, SyncStatsSnapshot};
