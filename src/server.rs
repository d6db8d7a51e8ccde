//! WebSocket transport
//!
//! `GET /ws` upgrades to a socket served by one task owning one
//! `SessionOrchestrator`. Client frames and the idle ticker are handled one
//! at a time, so events within a session never interleave.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::session::{ClientEvent, ServerEvent, SessionOrchestrator, SessionServices};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<SessionServices>,
    pub idle_tick: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "activeSessions": state.services.registry.len(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut orchestrator = SessionOrchestrator::new(Arc::clone(&state.services));
    let connection_id = orchestrator.connection_id();
    debug!("[{}] Connection opened", connection_id);

    let mut ticker = tokio::time::interval(state.idle_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        let outgoing = tokio::select! {
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(&mut orchestrator, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("[{}] Socket error: {}", connection_id, e);
                    break;
                }
            },
            _ = ticker.tick() => orchestrator.on_idle_tick(),
        };

        if let Err(e) = send_all(&mut sender, outgoing).await {
            warn!("[{}] Send failed: {}", connection_id, e);
            break;
        }
    }

    orchestrator.disconnect();
    debug!("[{}] Connection closed", connection_id);
}

/// Decode one text frame and handle it
async fn handle_text(orchestrator: &mut SessionOrchestrator, text: &str) -> Vec<ServerEvent> {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => orchestrator.handle(event).await,
        Err(e) => vec![ServerEvent::error(format!("Invalid message: {}", e))],
    }
}

async fn send_all(
    sender: &mut SplitSink<WebSocket, Message>,
    events: Vec<ServerEvent>,
) -> Result<(), axum::Error> {
    for event in events {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode {} event: {}", event.name(), e);
                continue;
            }
        };
        sender.send(Message::Text(json.into())).await?;
    }
    Ok(())
}
