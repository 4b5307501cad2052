//! The thin HTTP surface the visualization layer talks to: a full-topology
//! snapshot for (re)connecting clients, live change batches over a
//! WebSocket, and the pipeline's drop counters.

use crate::changelog::{self, UpdateSink};
use crate::config::AppConfig;
use crate::pipeline::PipelineStats;
use crate::store::TopologyStore;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<TopologyStore>,
    pub sink: UpdateSink,
    pub stats: Arc<PipelineStats>,
    pub done: Arc<AtomicBool>,
}

pub async fn serve(state: AppState) -> Result<()> {
    let router = Router::new()
        .route("/api/snapshot", get(snapshot))
        .route("/api/stats", get(stats))
        .route("/ws/updates", get(ws_updates))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: SocketAddr = state.config.http_bind.parse()?;
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("serving topology on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown(state.done))
        .await?;

    Ok(())
}

async fn graceful_shutdown(done: Arc<AtomicBool>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down, letting workers drain");
    done.store(true, Ordering::Release);
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(changelog::snapshot(&state.store))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.view())
}

async fn ws_updates(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Seeds the client with a snapshot, then forwards published batches in
/// publish order. A lagged receiver just resubscribes from the live edge;
/// at-least-once delivery is the snapshot's job, not the stream's.
async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.sink.subscribe();

    let seed = changelog::snapshot(&state.store);
    if let Ok(payload) = serde_json::to_string(&seed) {
        if socket.send(Message::Text(payload)).await.is_err() {
            return;
        }
    }

    loop {
        match rx.recv().await {
            Ok(batch) => {
                let payload = match serde_json::to_string(&batch) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("ws client lagged, skipped {skipped} batches");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
