//! WebSocket handler: scene relay.
//!
//! DESIGN
//! ======
//! On upgrade, registers a client ID with an outbox and enters a `select!`
//! loop:
//! - Incoming client text -> decode + dispatch by message `type`
//! - Messages broadcast by peers -> forward to this client
//!
//! Handler functions return an `Outcome`; the dispatch layer owns who
//! receives what.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade -> register outbox, send the stored scene (if any)
//! 2. Client sends messages -> dispatch -> Outcome applied
//! 3. Close, or outbox dropped by a broadcast -> unregister
//!
//! `connection_status` is generated by each client's own transport and is
//! never sent or relayed by the server.

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::{relay, scene};
use crate::state::{AppState, CLIENT_OUTBOX_CAPACITY};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. Handlers never send directly.
#[derive(Debug)]
enum Outcome {
    /// Every client gets the message, the sender included.
    BroadcastAll(Message),
    /// Every client except the sender.
    BroadcastOthers(Message),
    /// The sender only.
    Reply(Message),
    /// Nothing goes out.
    Ignore,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<Message>(CLIENT_OUTBOX_CAPACITY);
    let count = relay::register(&state, client_id, client_tx).await;
    info!(%client_id, clients = count, "ws: client connected");

    let stored = state.scene.read().await.clone();
    let greeted = match stored {
        Some(current) => send_message(&mut socket, &Message::scene_update(current)).await.is_ok(),
        None => true,
    };

    if greeted {
        loop {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        WsMessage::Text(text) => {
                            if !dispatch_text(&state, &mut socket, client_id, text.as_str()).await {
                                break;
                            }
                        }
                        WsMessage::Close(_) => break,
                        _ => {}
                    }
                }
                outgoing = client_rx.recv() => {
                    // `None`: a broadcast dropped this client's outbox.
                    let Some(message) = outgoing else { break };
                    if send_message(&mut socket, &message).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    let remaining = relay::unregister(&state, client_id).await;
    info!(%client_id, clients = remaining, "ws: client disconnected");
}

/// Process one inbound text message and write any replies to the sender.
/// Returns `false` once the socket can no longer be written.
async fn dispatch_text(state: &AppState, socket: &mut WebSocket, client_id: Uuid, text: &str) -> bool {
    for reply in process_inbound_text(state, client_id, text).await {
        if send_message(socket, &reply).await.is_err() {
            return false;
        }
    }
    true
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode and handle one inbound message; broadcasts happen here and the
/// messages for the sender are returned.
async fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) -> Vec<Message> {
    let message = match frames::decode_message(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound message");
            return Vec::new();
        }
    };
    debug!(%client_id, kind = message.kind(), "ws: recv");

    let outcome = match message {
        Message::SceneUpdate { scene } => handle_scene_update(state, scene).await,
        Message::HighlightMarker { marker_id } if marker_id.is_empty() => Outcome::Ignore,
        relayed @ (Message::HighlightMarker { .. }
        | Message::BlankViewer
        | Message::UnblankViewer
        | Message::RotateViewer
        | Message::UnrotateViewer) => Outcome::BroadcastOthers(relayed),
        Message::RequestSceneUpdate => handle_request_scene(state).await,
        Message::ConnectionStatus { .. } | Message::Unknown => {
            debug!(%client_id, "ws: ignoring local-only or unknown message");
            Outcome::Ignore
        }
    };

    match outcome {
        Outcome::BroadcastAll(message) => {
            relay::broadcast(state, &message, Some(client_id)).await;
            vec![message]
        }
        Outcome::BroadcastOthers(message) => {
            relay::broadcast(state, &message, Some(client_id)).await;
            Vec::new()
        }
        Outcome::Reply(message) => vec![message],
        Outcome::Ignore => Vec::new(),
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Store and persist the scene, then send it to everyone. The write lock is
/// held across the file write so disk and memory agree on the last writer.
async fn handle_scene_update(state: &AppState, incoming: Value) -> Outcome {
    let mut current = state.scene.write().await;
    if let Err(e) = scene::save_current(&state.scenes_dir, &incoming).await {
        error!(error = %e, dir = %state.scenes_dir.display(), "ws: failed to persist scene");
    }
    *current = Some(incoming.clone());
    drop(current);
    Outcome::BroadcastAll(Message::scene_update(incoming))
}

async fn handle_request_scene(state: &AppState) -> Outcome {
    match state.scene.read().await.clone() {
        Some(current) => Outcome::Reply(Message::scene_update(current)),
        None => Outcome::Ignore,
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &Message) -> Result<(), ()> {
    let json = match frames::encode_message(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to encode message");
            return Err(());
        }
    };
    debug!(kind = message.kind(), "ws: send");
    socket.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
