//! Relay service: client registration and broadcast fan-out.
//!
//! ERROR HANDLING
//! ==============
//! Broadcast never waits on a slow client. A client whose outbox is full or
//! closed is removed from the map; its connection loop notices on its own.

use frames::Message;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

pub async fn register(state: &AppState, client_id: Uuid, tx: mpsc::Sender<Message>) -> usize {
    let mut clients = state.clients.write().await;
    clients.insert(client_id, tx);
    clients.len()
}

pub async fn unregister(state: &AppState, client_id: Uuid) -> usize {
    let mut clients = state.clients.write().await;
    clients.remove(&client_id);
    clients.len()
}

/// Send `message` to every client except `exclude`. Returns how many
/// clients accepted it.
pub async fn broadcast(state: &AppState, message: &Message, exclude: Option<Uuid>) -> usize {
    let mut delivered = 0;
    let mut dead = Vec::new();
    {
        let clients = state.clients.read().await;
        for (client_id, tx) in clients.iter() {
            if exclude == Some(*client_id) {
                continue;
            }
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%client_id, kind = message.kind(), "relay: outbox full; dropping client");
                    dead.push(*client_id);
                }
                Err(TrySendError::Closed(_)) => dead.push(*client_id),
            }
        }
    }
    if !dead.is_empty() {
        let mut clients = state.clients.write().await;
        for client_id in &dead {
            clients.remove(client_id);
        }
        info!(dropped = dead.len(), remaining = clients.len(), "relay: removed unreachable clients");
    }
    delivered
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
