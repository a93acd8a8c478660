//! Filesystem watcher using notify-rs.
//!
//! Raw notify events are classified at the source (dropping access and
//! metadata-only noise), pushed into a channel, and coalesced by a
//! debounce task that flushes a batch once the window passes with no
//! further events. A burst of writes therefore surfaces as one batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::{ChangeEvent, ChangeKind, EventBatch, WatchSignal};
use crate::error::WatchError;

/// Capacity of the outgoing signal channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Raw message from the notify callback thread to the debounce task.
#[derive(Debug)]
enum RawSignal {
    Event(ChangeEvent),
    Error(WatchError),
}

/// Watches a directory tree and yields debounced [`WatchSignal`]s.
///
/// The stream is lazy, infinite, and non-restartable: it yields `None`
/// only after [`ChangeWatcher::stop`] (or drop) releases the subscription.
#[derive(Debug)]
pub struct ChangeWatcher {
    /// Live watch registration; dropping it releases the subscription.
    subscription: Option<RecommendedWatcher>,
    raw_tx: Option<mpsc::UnboundedSender<RawSignal>>,
    signal_rx: mpsc::Receiver<WatchSignal>,
    root: PathBuf,
}

impl ChangeWatcher {
    /// Register a recursive watch on `root` with the given debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Subscribe`] if the root does not exist or the
    /// watch cannot be registered.
    pub fn start(root: impl Into<PathBuf>, debounce: Duration) -> Result<Self, WatchError> {
        let root = root.into();

        if !root.exists() {
            return Err(WatchError::subscribe(
                root.display().to_string(),
                "directory does not exist",
            ));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        tokio::spawn(debounce_loop(raw_rx, signal_tx, debounce));

        let subscription = register(&root, raw_tx.clone())?;
        tracing::info!(path = %root.display(), "Watching directory");

        Ok(Self {
            subscription: Some(subscription),
            raw_tx: Some(raw_tx),
            signal_rx,
            root,
        })
    }

    /// Receive the next signal: a coalesced batch or a watch error.
    ///
    /// Returns `None` once the watcher has been stopped and the stream has
    /// drained.
    pub async fn recv(&mut self) -> Option<WatchSignal> {
        self.signal_rx.recv().await
    }

    /// Re-register the watch after a stream error.
    ///
    /// The old registration is released first; coalescing state and the
    /// output stream are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Subscribe`] if registration fails again.
    pub fn resubscribe(&mut self) -> Result<(), WatchError> {
        self.subscription = None;

        let raw_tx = self
            .raw_tx
            .as_ref()
            .cloned()
            .ok_or_else(|| WatchError::subscribe(self.root.display().to_string(), "watcher stopped"))?;

        self.subscription = Some(register(&self.root, raw_tx)?);
        tracing::info!(path = %self.root.display(), "Re-registered watch");
        Ok(())
    }

    /// Release the subscription and terminate the signal stream.
    ///
    /// Pending events still in the debounce window are flushed before the
    /// stream ends.
    pub fn stop(&mut self) {
        self.subscription = None;
        self.raw_tx = None;
        tracing::info!(path = %self.root.display(), "Stopped watching directory");
    }

    /// The watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Create the notify watcher and register the recursive watch.
fn register(
    root: &Path,
    raw_tx: mpsc::UnboundedSender<RawSignal>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if let Some(kind) = classify(&event.kind) {
                    for path in event.paths {
                        let _ = raw_tx.send(RawSignal::Event(ChangeEvent::new(kind, path)));
                    }
                }
            }
            Err(e) => {
                let _ = raw_tx.send(RawSignal::Error(WatchError::Stream(e.to_string())));
            }
        }
    })
    .map_err(|e| WatchError::subscribe(root.display().to_string(), e))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| WatchError::subscribe(root.display().to_string(), e))?;

    Ok(watcher)
}

/// Map a notify event kind onto an indexable change kind.
///
/// Access and metadata-only events (permission changes and the like)
/// return `None` and are dropped at the source.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    use notify::event::RenameMode;

    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Some(ChangeKind::Moved),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            Some(ChangeKind::Written)
        }
        _ => None,
    }
}

/// Coalesce raw events into batches over the debounce window.
///
/// The window restarts with every event, so a batch is flushed only after
/// the filesystem has been quiet for the full interval. Errors bypass
/// coalescing and are forwarded immediately.
async fn debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<RawSignal>,
    signal_tx: mpsc::Sender<WatchSignal>,
    window: Duration,
) {
    let mut batch = EventBatch::new();

    loop {
        if batch.is_empty() {
            match raw_rx.recv().await {
                Some(RawSignal::Event(event)) => batch.add(event),
                Some(RawSignal::Error(e)) => {
                    if signal_tx.send(WatchSignal::Error(e)).await.is_err() {
                        return;
                    }
                }
                None => break,
            }
        } else {
            match tokio::time::timeout(window, raw_rx.recv()).await {
                Ok(Some(RawSignal::Event(event))) => batch.add(event),
                Ok(Some(RawSignal::Error(e))) => {
                    if signal_tx.send(WatchSignal::Error(e)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let flushed = std::mem::take(&mut batch);
                    if signal_tx.send(WatchSignal::Changes(flushed)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    if !batch.is_empty() {
        let _ = signal_tx.send(WatchSignal::Changes(batch)).await;
    }
}
