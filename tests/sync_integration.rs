//! Integration tests for the index synchronization core.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use findex::sync::{SyncController, SyncHandle, SyncState};
use findex::Config;

fn config(root: &Path, index: &Path, debounce_ms: u64) -> Config {
    Config {
        root_dir: root.to_path_buf(),
        index_dir: index.to_path_buf(),
        debounce_ms,
        ..Default::default()
    }
}

fn start(
    cfg: &Config,
) -> (
    SyncHandle,
    CancellationToken,
    tokio::task::JoinHandle<()>,
) {
    let controller = SyncController::new(cfg).expect("controller setup");
    let handle = controller.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(controller.run(shutdown.clone()));
    (handle, shutdown, task)
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

/// Initial build, unique and shared terms, then deletion: the full
/// hello-world scenario.
#[tokio::test]
async fn test_scan_build_query_and_deletion() {
    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "hello world").unwrap();
    fs::write(root.path().join("b.txt"), "goodbye world").unwrap();

    let cfg = config(root.path(), index.path(), 50);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

    let service = handle.query_service(10);

    let hello = service.search("hello").unwrap();
    assert_eq!(hello.len(), 1);
    assert!(hello[0].path.ends_with("a.txt"));

    let world = service.search("world").unwrap();
    assert_eq!(world.len(), 2);

    // Deleting b.txt triggers a rebuild that drops it from results.
    fs::remove_file(root.path().join("b.txt")).unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || {
            service
                .search("world")
                .map(|hits| hits.len() == 1 && hits[0].path.ends_with("a.txt"))
                .unwrap_or(false)
        })
        .await,
        "b.txt should disappear from results after the rebuild commits"
    );

    let goodbye = service.search("goodbye").unwrap();
    assert!(goodbye.is_empty());

    shutdown.cancel();
    task.await.unwrap();
}

/// A newly created file becomes searchable once its rebuild commits.
#[tokio::test]
async fn test_created_file_becomes_searchable() {
    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "hello world").unwrap();

    let cfg = config(root.path(), index.path(), 50);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

    let service = handle.query_service(10);
    assert!(service.search("zebra").unwrap().is_empty());

    fs::write(root.path().join("new.txt"), "a zebra appears").unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || {
            service
                .search("zebra")
                .map(|hits| hits.iter().any(|h| h.path.ends_with("new.txt")))
                .unwrap_or(false)
        })
        .await
    );

    shutdown.cancel();
    task.await.unwrap();
}

/// A burst of writes inside one debounce window causes exactly one
/// additional rebuild.
#[tokio::test]
async fn test_event_burst_coalesces_to_one_rebuild() {
    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("seed.txt"), "seed").unwrap();

    // Generous window so the whole burst lands inside it.
    let cfg = config(root.path(), index.path(), 500);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);
    assert_eq!(handle.stats().rebuilds_completed, 1);

    for i in 0..8 {
        fs::write(root.path().join(format!("burst{i}.txt")), "needle").unwrap();
    }

    let service = handle.query_service(20);
    assert!(
        wait_until(Duration::from_secs(10), || {
            service
                .search("needle")
                .map(|hits| hits.len() == 8)
                .unwrap_or(false)
        })
        .await
    );

    // Let any stray debounce window drain, then check the count.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        handle.stats().rebuilds_completed,
        2,
        "one burst must produce one rebuild"
    );

    shutdown.cancel();
    task.await.unwrap();
}

/// Queries keep succeeding while rebuilds are continuously committing.
#[tokio::test]
async fn test_queries_never_observe_partial_state() {
    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("stable.txt"), "anchor term").unwrap();

    let cfg = config(root.path(), index.path(), 50);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

    let service = handle.query_service(10);

    for round in 0..10 {
        fs::write(
            root.path().join("churn.txt"),
            format!("revision {round}"),
        )
        .unwrap();

        // Whatever generation is current, the anchor document is in it.
        let hits = service.search("anchor").unwrap();
        assert_eq!(hits.len(), 1, "round {round}");
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    shutdown.cancel();
    task.await.unwrap();
}

/// A failing rebuild leaves the previously committed generation serving.
#[cfg(unix)]
#[tokio::test]
async fn test_failed_rebuild_preserves_previous_generation() {
    use std::os::unix::fs::PermissionsExt;

    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "hello world").unwrap();

    // Window wide enough that the chmod below lands before the rescan.
    let cfg = config(root.path(), index.path(), 400);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);
    let service = handle.query_service(10);
    assert_eq!(service.search("hello").unwrap().len(), 1);

    // An unreadable file makes the next scan abort.
    let locked = root.path().join("locked.txt");
    fs::write(&locked, "secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Running as root bypasses permission bits; nothing to test there.
    if fs::read(&locked).is_ok() {
        shutdown.cancel();
        task.await.unwrap();
        return;
    }

    assert!(
        wait_until(Duration::from_secs(10), || {
            matches!(handle.state(), SyncState::Failed(_))
        })
        .await,
        "scan failure should surface as Failed"
    );

    // The old generation still answers.
    let hits = service.search("hello").unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].path.ends_with("a.txt"));

    // Making the file readable again and touching the tree recovers.
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    fs::write(root.path().join("kick.txt"), "recover").unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || {
            handle.is_live()
                && service
                    .search("secret")
                    .map(|hits| !hits.is_empty())
                    .unwrap_or(false)
        })
        .await,
        "next change event should retry and succeed"
    );

    shutdown.cancel();
    task.await.unwrap();
}

/// Rebuilding an unchanged tree yields identical query results.
#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let root = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "alpha beta").unwrap();
    fs::write(root.path().join("b.txt"), "beta gamma").unwrap();

    let cfg = config(root.path(), index.path(), 50);
    let (handle, shutdown, task) = start(&cfg);

    assert!(wait_until(Duration::from_secs(10), || handle.is_live()).await);

    let service = handle.query_service(10);
    let mut before: Vec<String> = service
        .search("beta")
        .unwrap()
        .into_iter()
        .map(|h| h.path)
        .collect();
    before.sort();

    // Rewrite a.txt with identical content to force a rebuild.
    fs::write(root.path().join("a.txt"), "alpha beta").unwrap();
    assert!(
        wait_until(Duration::from_secs(10), || {
            handle.stats().rebuilds_completed >= 2
        })
        .await
    );

    let mut after: Vec<String> = service
        .search("beta")
        .unwrap()
        .into_iter()
        .map(|h| h.path)
        .collect();
    after.sort();

    assert_eq!(before, after);

    shutdown.cancel();
    task.await.unwrap();
}
