//! Live reload over WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServerState;
use crate::error::BuildError;

/// Endpoint the injected client connects to
pub const LIVE_RELOAD_PATH: &str = "/__ferrule_live";

/// Live reload message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    /// Connection established
    Connected,

    /// Full page reload required
    FullReload { reason: String },

    /// Only extracted stylesheets changed
    CssUpdate { path: String },

    /// A rebuild failed; the previous output is still served
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
}

impl From<&BuildError> for HmrMessage {
    fn from(err: &BuildError) -> Self {
        HmrMessage::Error {
            message: err.to_string(),
            stage: err.stage().map(|s| s.to_string()),
        }
    }
}

/// Handle WebSocket upgrade for live reload
pub async fn hmr_websocket(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(|socket| handle_hmr_socket(socket, state))
}

/// Handle a live reload WebSocket connection
async fn handle_hmr_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before greeting so no broadcast is missed
    let mut hmr_rx = state.hmr_tx.subscribe();

    if let Ok(json) = serde_json::to_string(&HmrMessage::Connected) {
        let _ = sender.send(Message::Text(json)).await;
    }

    debug!("Live reload client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(message) = hmr_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    debug!("Live reload connection closed");
}

/// Inject the live reload client into an HTML document
pub fn inject_client(html: &str) -> String {
    let script = format!(
        r#"
<script>
(function() {{
  var ws = new WebSocket((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{}');

  ws.onmessage = function(event) {{
    var message = JSON.parse(event.data);

    switch (message.type) {{
      case 'full-reload':
        console.log('[ferrule] reload:', message.reason);
        location.reload();
        break;

      case 'css-update':
        console.log('[ferrule] stylesheet updated:', message.path);
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
          var url = new URL(link.href);
          url.searchParams.set('t', Date.now());
          link.href = url.toString();
        }});
        break;

      case 'error':
        console.error('[ferrule] build failed' + (message.stage ? ' in ' + message.stage : '') + ':\n' + message.message);
        break;

      case 'connected':
        console.log('[ferrule] live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[ferrule] live reload disconnected, reloading when the server is back...');
    setTimeout(function() {{ location.reload(); }}, 1000);
  }};
}})();
</script>
"#,
        LIVE_RELOAD_PATH
    );

    // Insert before </body> or at the end
    if let Some(pos) = html.rfind("</body>") {
        let mut result = html.to_string();
        result.insert_str(pos, &script);
        result
    } else {
        format!("{}{}", html, script)
    }
}
