//! The index synchronization state machine.
//!
//! One controller task consumes the watch stream and owns the rebuild
//! lifecycle: initial full build at startup, then a full rescan and
//! rebuild per qualifying change batch. At most one build is in flight;
//! events arriving mid-build collapse into a single pending rebuild.
//! Queries are never blocked: they keep reading the committed generation
//! until the next atomic publish.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::index::{ContentLoader, Generation, IndexBuilder, QueryService, SharedIndex};
use crate::watcher::{ChangeWatcher, WatchSignal};
use crate::Result;

/// Initial delay before retrying a failed watch re-registration.
const WATCH_RETRY_INITIAL: Duration = Duration::from_millis(500);

/// Ceiling for the watch retry backoff.
const WATCH_RETRY_MAX: Duration = Duration::from_secs(30);

/// Lifecycle state of the sync controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Constructed, not yet running.
    Idle,
    /// A scan + build is in flight.
    Building,
    /// The latest build is committed and serving queries.
    Live,
    /// The latest build failed; the previous generation (if any) still
    /// serves queries.
    Failed(String),
}

/// Counters for sync activity.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub rebuilds_completed: AtomicU64,
    pub rebuilds_failed: AtomicU64,
    pub documents_indexed: AtomicU64,
    pub watch_errors: AtomicU64,
}

impl SyncStats {
    /// Create a new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            rebuilds_completed: self.rebuilds_completed.load(Ordering::Relaxed),
            rebuilds_failed: self.rebuilds_failed.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            watch_errors: self.watch_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sync stats.
#[derive(Debug, Clone, Copy)]
pub struct SyncStatsSnapshot {
    pub rebuilds_completed: u64,
    pub rebuilds_failed: u64,
    pub documents_indexed: u64,
    pub watch_errors: u64,
}

/// Shared view of a running controller: state, stats, and the query path.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    shared: Arc<SharedIndex>,
    state: Arc<Mutex<SyncState>>,
    stats: Arc<SyncStats>,
}

impl SyncHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.lock().clone()
    }

    /// Whether the latest build is committed and serving.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.state(), SyncState::Live)
    }

    /// Snapshot of activity counters.
    #[must_use]
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }

    /// Build a query service over the controller's generation handle.
    #[must_use]
    pub fn query_service(&self, limit: usize) -> QueryService {
        QueryService::new(Arc::clone(&self.shared), limit)
    }
}

/// Drives the initial build and all subsequent rebuilds.
pub struct SyncController {
    loader: ContentLoader,
    builder: Arc<IndexBuilder>,
    shared: Arc<SharedIndex>,
    watcher: ChangeWatcher,
    state: Arc<Mutex<SyncState>>,
    stats: Arc<SyncStats>,
    /// Events under this prefix are dropped (index dir inside the root).
    index_prefix: Option<PathBuf>,
}

impl SyncController {
    /// Set up the loader, builder, shared handle, and watch subscription.
    ///
    /// Must be called from within a tokio runtime; the watcher spawns its
    /// debounce task immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the index storage cannot be prepared or the
    /// watch cannot be registered.
    pub fn new(config: &Config) -> Result<Self> {
        let builder = Arc::new(IndexBuilder::new(&config.index_dir)?);
        let shared = Arc::new(SharedIndex::new(&config.index_dir));

        let mut loader = ContentLoader::new(&config.root_dir);
        let index_prefix = if config.index_inside_root() {
            loader = loader.with_exclude(&config.index_dir);
            Some(config.index_dir.clone())
        } else {
            None
        };

        let watcher = ChangeWatcher::start(&config.root_dir, config.debounce())?;

        Ok(Self {
            loader,
            builder,
            shared,
            watcher,
            state: Arc::new(Mutex::new(SyncState::Idle)),
            stats: SyncStats::new(),
            index_prefix,
        })
    }

    /// Shared view for queries and introspection.
    #[must_use]
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            shared: Arc::clone(&self.shared),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Run until the token is cancelled or the watch stream ends.
    ///
    /// On shutdown the watch subscription is released first, then any
    /// in-flight build is awaited and discarded unpublished, leaving the
    /// live generation untouched.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(root = %self.loader.root().display(), "Starting initial index build");
        self.set_state(SyncState::Building);

        let mut build: Option<JoinHandle<Result<(Generation, usize)>>> =
            Some(self.spawn_build());
        let mut pending = false;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,

                result = async { build.as_mut().expect("in-flight build").await }, if build.is_some() => {
                    build = None;
                    self.finish_build(result);
                    if pending {
                        pending = false;
                        tracing::info!("Changes arrived during build, rebuilding");
                        self.set_state(SyncState::Building);
                        build = Some(self.spawn_build());
                    }
                }

                signal = self.watcher.recv() => match signal {
                    Some(WatchSignal::Changes(mut batch)) => {
                        if let Some(ref prefix) = self.index_prefix {
                            batch.retain_outside(prefix);
                        }
                        if batch.is_empty() {
                            continue;
                        }

                        tracing::info!(events = batch.len(), "Filesystem changed, rebuilding index");
                        if build.is_some() {
                            pending = true;
                        } else {
                            self.set_state(SyncState::Building);
                            build = Some(self.spawn_build());
                        }
                    }
                    Some(WatchSignal::Error(e)) => {
                        self.stats.watch_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "Watch error, serving last good generation");
                        if !self.recover_watch(&shutdown).await {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("Watch stream ended");
                        break;
                    }
                },
            }
        }

        // Stop producing events before dealing with any in-flight build.
        self.watcher.stop();

        if let Some(handle) = build {
            match handle.await {
                Ok(Ok((generation, _))) => {
                    tracing::info!(
                        ordinal = generation.ordinal(),
                        "Discarding in-flight build on shutdown"
                    );
                    drop(generation);
                }
                Ok(Err(e)) => tracing::debug!(error = %e, "In-flight build failed during shutdown"),
                Err(e) => tracing::debug!(error = %e, "In-flight build task aborted"),
            }
        }

        tracing::info!("Sync controller stopped");
    }

    /// Scan + build on a blocking worker so the event loop and queries
    /// keep running.
    fn spawn_build(&self) -> JoinHandle<Result<(Generation, usize)>> {
        let loader = self.loader.clone();
        let builder = Arc::clone(&self.builder);

        tokio::task::spawn_blocking(move || {
            let docs = loader.scan()?;
            let count = docs.len();
            let generation = builder.build(&docs)?;
            Ok((generation, count))
        })
    }

    fn finish_build(
        &self,
        result: std::result::Result<Result<(Generation, usize)>, tokio::task::JoinError>,
    ) {
        match result {
            Ok(Ok((generation, documents))) => match self.shared.publish(generation) {
                Ok(committed) => {
                    self.stats.rebuilds_completed.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .documents_indexed
                        .fetch_add(documents as u64, Ordering::Relaxed);
                    self.set_state(SyncState::Live);
                    tracing::info!(
                        ordinal = committed.ordinal(),
                        documents,
                        "Committed index generation"
                    );
                }
                Err(e) => self.fail_build(&e.into()),
            },
            Ok(Err(e)) => self.fail_build(&e),
            Err(e) => self.fail_build(&crate::Error::internal(format!("build task failed: {e}"))),
        }
    }

    fn fail_build(&self, error: &crate::Error) {
        self.stats.rebuilds_failed.fetch_add(1, Ordering::Relaxed);
        self.set_state(SyncState::Failed(error.to_string()));
        tracing::error!(error = %error, "Rebuild failed, serving last good generation");
    }

    /// Re-register the watch with exponential backoff until it sticks or
    /// shutdown is requested. Returns `false` on shutdown.
    async fn recover_watch(&mut self, shutdown: &CancellationToken) -> bool {
        let mut delay = WATCH_RETRY_INITIAL;

        loop {
            match self.watcher.resubscribe() {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?delay, "Watch re-registration failed");
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => return false,
                () = tokio::time::sleep(delay) => {}
            }

            delay = (delay * 2).min(WATCH_RETRY_MAX);
        }
    }

    fn set_state(&self, next: SyncState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::info!(from = ?*state, to = ?next, "Sync state transition");
        }
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path, index: &std::path::Path) -> Config {
        Config {
            root_dir: root.to_path_buf(),
            index_dir: index.to_path_buf(),
            debounce_ms: 50,
            ..Default::default()
        }
    }

    async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_initial_build_goes_live() {
        let root = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), "hello world").unwrap();

        let controller = SyncController::new(&test_config(root.path(), index.path())).unwrap();
        let handle = controller.handle();
        assert_eq!(handle.state(), SyncState::Idle);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);
        assert_eq!(handle.stats().rebuilds_completed, 1);
        assert_eq!(handle.stats().documents_indexed, 1);

        let hits = handle.query_service(10).search("hello").unwrap();
        assert_eq!(hits.len(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_initial_build_reports_state() {
        let root = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), "content").unwrap();

        let index_dir = index.path().join("store");
        let controller = SyncController::new(&test_config(root.path(), &index_dir)).unwrap();
        let handle = controller.handle();

        // Replace the index directory with a file so staging fails.
        fs::remove_dir_all(&index_dir).unwrap();
        fs::write(&index_dir, "not a directory").unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        assert!(
            wait_until(Duration::from_secs(10), || {
                matches!(handle.state(), SyncState::Failed(_))
            })
            .await
        );
        assert_eq!(handle.stats().rebuilds_failed, 1);
        assert!(matches!(
            handle.query_service(10).search("anything"),
            Err(crate::error::IndexError::NotReady)
        ));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_change_triggers_rebuild() {
        let root = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), "hello world").unwrap();

        let controller = SyncController::new(&test_config(root.path(), index.path())).unwrap();
        let handle = controller.handle();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

        fs::write(root.path().join("b.txt"), "fresh content").unwrap();

        let service = handle.query_service(10);
        assert!(
            wait_until(Duration::from_secs(10), || {
                service
                    .search("fresh")
                    .map(|hits| !hits.is_empty())
                    .unwrap_or(false)
            })
            .await
        );

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_clean() {
        let root = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), "content").unwrap();

        let controller = SyncController::new(&test_config(root.path(), index.path())).unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("controller should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_index_dir_inside_root_is_excluded() {
        let root = TempDir::new().unwrap();
        let index_dir = root.path().join(".findex");
        fs::write(root.path().join("a.txt"), "hello world").unwrap();

        let controller = SyncController::new(&test_config(root.path(), &index_dir)).unwrap();
        let handle = controller.handle();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.run(shutdown.clone()));

        assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

        // Only a.txt is indexed; the index's own files are not documents.
        assert_eq!(handle.stats().documents_indexed, 1);

        // Give the watcher a couple of debounce windows: index writes from
        // the initial build must not have queued another rebuild.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(handle.stats().rebuilds_completed, 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
