//! Dev server session
//!
//! A [`DevSession`] owns everything the dev server needs for its lifetime: the
//! bundler, the served snapshot, the HTTP server task, the file watcher and
//! the rebuild worker. Only the worker replaces the snapshot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use colored::Colorize;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    router, spawn_worker, watch_inputs, webbrowser_open, HmrMessage, InputWatcher, ServerState,
    SharedSnapshot,
};
use crate::bundler::{BuildOutput, Bundler, OutputSnapshot};
use crate::config::Config;
use crate::error::{BuildError, BuildResult};
use crate::styles::StyleMode;
use crate::utils;

/// How long shutdown waits for the rebuild worker and open connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Serving,
    Rebuilding,
}

/// A running (or stopped) dev server
pub struct DevSession {
    bundler: Arc<Bundler>,
    state: Arc<RwLock<SessionState>>,
    snapshot: SharedSnapshot,
    hmr_tx: broadcast::Sender<HmrMessage>,
    addr: Option<SocketAddr>,
    changes_tx: Option<mpsc::UnboundedSender<Vec<PathBuf>>>,
    worker: Option<JoinHandle<()>>,
    watcher: Option<Arc<Mutex<InputWatcher>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl DevSession {
    /// Create a stopped session
    pub fn new(config: Config) -> BuildResult<Self> {
        let (hmr_tx, _) = broadcast::channel(100);

        Ok(Self {
            bundler: Arc::new(Bundler::new(config)?),
            state: Arc::new(RwLock::new(SessionState::Stopped)),
            snapshot: Arc::new(RwLock::new(Arc::new(OutputSnapshot::new()))),
            hmr_tx,
            addr: None,
            changes_tx: None,
            worker: None,
            watcher: None,
            shutdown_tx: None,
            server: None,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Address the server is bound to, once serving
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// The output currently served
    pub fn snapshot(&self) -> Arc<OutputSnapshot> {
        self.snapshot.read().clone()
    }

    /// Receive the messages sent to live reload clients
    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.hmr_tx.subscribe()
    }

    /// Report changed paths as if the watcher had seen them
    pub fn notify_changed(&self, paths: Vec<PathBuf>) {
        if let Some(tx) = &self.changes_tx {
            let _ = tx.send(paths);
        }
    }

    /// Build, bind and start watching
    ///
    /// A failing initial build is fatal: the session stays stopped.
    pub async fn init(&mut self) -> BuildResult<SocketAddr> {
        if self.state() != SessionState::Stopped {
            return Err(BuildError::Server {
                addr: self.addr.map(|a| a.to_string()).unwrap_or_default(),
                message: "session is already running".to_string(),
            });
        }

        let config = self.bundler.config().clone();
        let dev = config.dev.clone();

        let output = self.bundler.build().await?;
        report_build(&output);
        let inputs = output.inputs;
        *self.snapshot.write() = Arc::new(output.snapshot);

        let bind_addr = format!("{}:{}", dev.host, dev.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| BuildError::Server {
                addr: bind_addr.clone(),
                message: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(|e| BuildError::Server {
            addr: bind_addr.clone(),
            message: e.to_string(),
        })?;

        let app = router(
            Arc::new(ServerState {
                snapshot: self.snapshot.clone(),
                hmr_tx: self.hmr_tx.clone(),
                live_reload: dev.live_reload,
                history_api_fallback: dev.history_api_fallback,
                index: dev.index.clone(),
            }),
            dev.compress,
        );

        let window = Duration::from_millis(dev.debounce_ms);
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let mut watcher = watch_inputs(
            &config.watch_paths(),
            config.ignored_paths(),
            window,
            changes_tx.clone(),
        )?;
        watcher.cover_inputs(&inputs);
        let watcher = Arc::new(Mutex::new(watcher));
        self.changes_tx = Some(changes_tx);
        self.worker = Some(self.spawn_rebuild_worker(
            changes_rx,
            window,
            Arc::downgrade(&watcher),
        ));
        self.watcher = Some(watcher);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.server = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        }));
        self.shutdown_tx = Some(shutdown_tx);

        self.addr = Some(addr);
        *self.state.write() = SessionState::Serving;
        info!("Server listening on http://{}", addr);

        if dev.open {
            let url = format!("http://{}:{}", dev.host, addr.port());
            if let Err(e) = webbrowser_open(&url) {
                debug!("Failed to open browser: {}", e);
            }
        }

        Ok(addr)
    }

    fn spawn_rebuild_worker(
        &self,
        changes_rx: mpsc::UnboundedReceiver<Vec<PathBuf>>,
        window: Duration,
        watcher: Weak<Mutex<InputWatcher>>,
    ) -> JoinHandle<()> {
        let bundler = self.bundler.clone();
        let snapshot = self.snapshot.clone();
        let state = self.state.clone();
        let hmr_tx = self.hmr_tx.clone();
        let live_reload = bundler.config().dev.live_reload;

        spawn_worker(changes_rx, window, move |changed| {
            let bundler = bundler.clone();
            let snapshot = snapshot.clone();
            let state = state.clone();
            let hmr_tx = hmr_tx.clone();
            let watcher = watcher.clone();

            async move {
                *state.write() = SessionState::Rebuilding;
                eprintln!(
                    "  {} {} changed, rebuilding...",
                    "↻".yellow(),
                    describe_changes(&bundler, &changed).dimmed()
                );

                let message = match bundler.build().await {
                    Ok(output) => {
                        report_build(&output);
                        let message = reload_message(&bundler, &output, &changed);
                        // The session owns the watcher; it is gone once shutdown begins
                        if let Some(watcher) = watcher.upgrade() {
                            watcher.lock().cover_inputs(&output.inputs);
                        }
                        *snapshot.write() = Arc::new(output.snapshot);
                        message
                    }
                    Err(e) => {
                        error!("Rebuild failed, still serving the previous build: {}", e);
                        eprintln!("  {} {}", "✗".red().bold(), e);
                        HmrMessage::from(&e)
                    }
                };

                if live_reload {
                    let _ = hmr_tx.send(message);
                }

                let mut current = state.write();
                if *current == SessionState::Rebuilding {
                    *current = SessionState::Serving;
                }
            }
        })
    }

    /// Stop watching, let the worker finish and shut the server down
    pub async fn shutdown(&mut self) -> BuildResult<()> {
        if self.state() == SessionState::Stopped {
            return Ok(());
        }

        debug!("Shutting down dev session");

        // Dropping the watcher and the last sender ends the worker's channel
        self.watcher.take();
        self.changes_tx.take();
        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Rebuild worker ended abnormally: {}", e),
                Err(_) => worker.abort(),
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Server error during shutdown: {}", e),
                Ok(Err(e)) => warn!("Server task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Open connections did not close in time");
                    server.abort();
                }
            }
        }

        *self.state.write() = SessionState::Stopped;
        info!("Dev server stopped");
        Ok(())
    }
}

/// Reload only stylesheets when every change is a stylesheet and styles are extracted
fn reload_message(bundler: &Bundler, output: &BuildOutput, changed: &[PathBuf]) -> HmrMessage {
    let rules = bundler.rules();
    let styles_only = !changed.is_empty() && changed.iter().all(|p| rules.style_chain(p).is_some());
    let extracted = matches!(rules.style_mode(), Ok(StyleMode::Extract { .. }));

    if styles_only && extracted {
        if let Some(stylesheet) = output.bundles.iter().find_map(|b| b.stylesheet.clone()) {
            return HmrMessage::CssUpdate { path: stylesheet };
        }
    }

    HmrMessage::FullReload {
        reason: describe_changes(bundler, changed),
    }
}

fn describe_changes(bundler: &Bundler, changed: &[PathBuf]) -> String {
    let root = &bundler.config().root;
    match changed {
        [single] => utils::module_key(root, single),
        _ => format!("{} files", changed.len()),
    }
}

fn report_build(output: &BuildOutput) {
    eprintln!(
        "  {} Built {} module(s) in {}",
        "✓".green().bold(),
        output.modules,
        utils::format_duration(output.duration)
    );
}
