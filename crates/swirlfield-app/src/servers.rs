//! HTTP surface: snapshot query, WebSocket stream, and static viewer assets.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use swirlfield_core::FieldState;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::SharedField;
use crate::broadcast::Broadcaster;

/// State shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub field: SharedField,
    pub broadcaster: Arc<Broadcaster>,
}

/// Builds the router: `GET /state` (pull), `GET /ws` (push stream), and a
/// static-file fallback serving the viewer page.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/state", get(state_snapshot))
        .route("/ws", get(ws_upgrade))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// Returns the current field as `{width, height, samples: [...]}`, row-major.
async fn state_snapshot(State(app): State<AppState>) -> Json<FieldState> {
    let snapshot = app
        .field
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Json(snapshot)
}

async fn ws_upgrade(State(app): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade
        .on_failed_upgrade(|err| warn!(%err, "websocket upgrade failed"))
        .on_upgrade(move |socket| serve_viewer(app, socket))
}

/// Per-connection task: forwards broadcast payloads to the socket until the
/// viewer disconnects or a send fails, then unregisters.
async fn serve_viewer(app: AppState, socket: WebSocket) {
    let (key, mut payloads) = app.broadcaster.register();
    info!(?key, viewers = app.broadcaster.viewer_count(), "viewer connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            payload = payloads.recv() => {
                match payload {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Channel closed: the broadcaster pruned this viewer.
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Viewers have nothing to say; drain and ignore.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    app.broadcaster.unregister(key);
    info!(?key, viewers = app.broadcaster.viewer_count(), "viewer disconnected");
}
