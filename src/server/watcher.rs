//! Input watching and the rebuild worker
//!
//! Filesystem events are forwarded as batches of changed paths into a channel.
//! A single worker task drains that channel: it waits for a quiet window,
//! coalesces everything received so far into one batch and runs one rebuild.
//! Events arriving while a rebuild runs form the next batch.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{BuildError, BuildResult};

/// Wait for the next change and collect everything until `window` passes quietly
///
/// Returns `None` once the channel is closed and drained.
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<Vec<PathBuf>>,
    window: Duration,
) -> Option<Vec<PathBuf>> {
    let mut batch = rx.recv().await?;

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(more)) => batch.extend(more),
            Ok(None) | Err(_) => break,
        }
    }

    batch.sort();
    batch.dedup();
    Some(batch)
}

/// Spawn the task that owns rebuilding
///
/// Rebuilds never overlap: the next batch is only collected after `rebuild`
/// completes.
pub fn spawn_worker<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    window: Duration,
    mut rebuild: F,
) -> JoinHandle<()>
where
    F: FnMut(Vec<PathBuf>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(batch) = next_batch(&mut rx, window).await {
            debug!("Rebuilding for {} changed path(s)", batch.len());
            rebuild(batch).await;
        }
        debug!("Rebuild worker stopped");
    })
}

/// A live filesystem watch over the project's inputs
///
/// Starts from the configured paths and grows as builds discover modules in
/// directories nobody watches yet.
pub struct InputWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
    watched: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
}

impl InputWatcher {
    /// Paths currently under watch
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Start watching `path` unless it is ignored, missing or already covered
    ///
    /// Returns whether a new watch was added.
    pub fn watch(&mut self, path: &Path) -> BuildResult<bool> {
        if is_ignored(path, &self.ignored) || self.watched.iter().any(|w| path.starts_with(w)) {
            return Ok(false);
        }
        if !path.exists() {
            debug!("Not watching missing path {}", path.display());
            return Ok(false);
        }

        let mode = if path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.debouncer
            .watcher()
            .watch(path, mode)
            .map_err(|e| watch_error(path, e))?;
        debug!("Watching {}", path.display());

        self.watched.push(path.to_path_buf());
        Ok(true)
    }

    /// Watch the parent directory of every module a build traced
    pub fn cover_inputs<'a>(&mut self, inputs: impl IntoIterator<Item = &'a PathBuf>) {
        for input in inputs {
            let Some(dir) = input.parent() else { continue };
            if let Err(e) = self.watch(dir) {
                warn!("Failed to watch {}: {}", dir.display(), e);
            }
        }
    }
}

/// Watch input paths and forward changes, skipping ignored directories
pub fn watch_inputs(
    paths: &[PathBuf],
    ignored: Vec<PathBuf>,
    debounce: Duration,
    tx: mpsc::UnboundedSender<Vec<PathBuf>>,
) -> BuildResult<InputWatcher> {
    let filter = ignored.clone();
    let debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let changed: Vec<PathBuf> = events
                .into_iter()
                .map(|event| event.path)
                .filter(|path| !is_ignored(path, &filter))
                .collect();

            if !changed.is_empty() {
                let _ = tx.send(changed);
            }
        }
        Err(e) => error!("Watch error: {:?}", e),
    })
    .map_err(|e| watch_error(Path::new("."), e))?;

    let mut watcher = InputWatcher {
        debouncer,
        watched: Vec::new(),
        ignored,
    };
    for path in paths {
        watcher.watch(path)?;
    }

    Ok(watcher)
}

fn is_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    ignored.iter().any(|dir| path.starts_with(dir))
}

fn watch_error(path: &Path, err: notify::Error) -> BuildError {
    BuildError::io(path, std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rapid_events_cause_one_rebuild() {
        let (tx, rx) = mpsc::unbounded_channel();
        let rebuilds = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let worker = {
            let rebuilds = rebuilds.clone();
            let seen = seen.clone();
            spawn_worker(rx, Duration::from_millis(200), move |batch| {
                rebuilds.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(batch);
                async {}
            })
        };

        for name in ["a.js", "b.js", "a.js"] {
            tx.send(vec![PathBuf::from(name)]).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        drop(tx);
        worker.await.unwrap();

        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
        assert_eq!(
            seen.lock()[0],
            vec![PathBuf::from("a.js"), PathBuf::from("b.js")]
        );
    }

    #[tokio::test]
    async fn test_events_during_rebuild_coalesce_into_next_cycle() {
        let (tx, rx) = mpsc::unbounded_channel();
        let rebuilds = Arc::new(AtomicUsize::new(0));

        let worker = {
            let rebuilds = rebuilds.clone();
            spawn_worker(rx, Duration::from_millis(50), move |_| {
                rebuilds.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300))
            })
        };

        tx.send(vec![PathBuf::from("a.js")]).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The first rebuild is running now
        for _ in 0..3 {
            tx.send(vec![PathBuf::from("b.js")]).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(800)).await;
        drop(tx);
        worker.await.unwrap();

        assert_eq!(rebuilds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ignored_paths() {
        let ignored = vec![PathBuf::from("/project/dist"), PathBuf::from("/project/pkg")];

        assert!(is_ignored(Path::new("/project/dist/index.js"), &ignored));
        assert!(is_ignored(Path::new("/project/pkg/index_bg.wasm"), &ignored));
        assert!(!is_ignored(Path::new("/project/js/index.js"), &ignored));
        assert!(!is_ignored(Path::new("/project/distance.js"), &ignored));
    }

    #[test]
    fn test_watch_grows_with_traced_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["js", "styles/partials", "dist"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = watch_inputs(
            &[root.join("js")],
            vec![root.join("dist")],
            Duration::from_millis(50),
            tx,
        )
        .unwrap();

        let inputs = vec![
            root.join("js/index.js"),
            root.join("styles/main.scss"),
            root.join("styles/partials/_colors.scss"),
            root.join("dist/index.js"),
            root.join("vendor/missing.js"),
        ];
        watcher.cover_inputs(&inputs);

        assert_eq!(watcher.watched(), &[root.join("js"), root.join("styles")]);
        assert!(!watcher.watch(&root.join("styles/partials")).unwrap());
    }
}
