//! Development server with live reload
//!
//! Provides a local development server with:
//! - In-memory serving of the latest build output
//! - History-API fallback to the entry document
//! - WebSocket-based live reload
//! - File watching and debounced rebuilds

mod hmr;
mod session;
mod watcher;

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::bundler::OutputSnapshot;

pub use hmr::{inject_client, HmrMessage, LIVE_RELOAD_PATH};
pub use session::{DevSession, SessionState};
pub use watcher::{next_batch, spawn_worker, watch_inputs, InputWatcher};

/// The output being served, replaced wholesale after each successful rebuild
pub type SharedSnapshot = Arc<RwLock<Arc<OutputSnapshot>>>;

/// Shared server state
pub struct ServerState {
    /// Current build output
    pub snapshot: SharedSnapshot,

    /// Live reload broadcast channel
    pub hmr_tx: broadcast::Sender<HmrMessage>,

    /// Whether the live reload client is injected
    pub live_reload: bool,

    /// Whether unknown paths get the entry document
    pub history_api_fallback: bool,

    /// Entry document, relative to the output root
    pub index: String,
}

/// Build the dev server router
pub fn router(state: Arc<ServerState>, compress: bool) -> Router {
    let app = Router::new()
        .route(LIVE_RELOAD_PATH, get(hmr::hmr_websocket))
        .fallback(serve_path)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if compress {
        app.layer(CompressionLayer::new())
    } else {
        app
    }
}

/// Serve a path from the snapshot, falling back to the entry document
async fn serve_path(State(state): State<Arc<ServerState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    // Clone the Arc so the lock is not held while responding
    let snapshot = state.snapshot.read().clone();

    let requested = uri.path().trim_start_matches('/');
    let path = if requested.is_empty() || requested.ends_with('/') {
        format!("{}{}", requested, state.index)
    } else {
        requested.to_string()
    };

    if let Some(content) = snapshot.get(&path) {
        return file_response(&state, &path, content);
    }

    if state.history_api_fallback {
        if let Some(index) = snapshot.get(&state.index) {
            debug!("Fallback for /{} -> {}", path, state.index);
            return file_response(&state, &state.index, index);
        }
    }

    (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response()
}

fn file_response(state: &ServerState, path: &str, content: &[u8]) -> Response {
    let content_type = get_content_type(Path::new(path));

    let body = if state.live_reload && content_type.starts_with("text/html") {
        inject_client(&String::from_utf8_lossy(content)).into_bytes()
    } else {
        content.to_vec()
    };

    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Get content type for a file
fn get_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "wasm" => "application/wasm",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// Open URL in browser
pub fn webbrowser_open(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }

    Ok(())
}
