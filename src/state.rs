//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the connected clients (each an outbox sender) and the current
//! scene document, which the relay keeps as opaque JSON.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use frames::Message;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Outbox depth per client. A client this far behind is dropped.
pub const CLIENT_OUTBOX_CAPACITY: usize = 256;

/// Shared application state. Clone is required by Axum; every field is
/// Arc-wrapped or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Connected clients: `client_id` -> sender for outgoing messages.
    pub clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Message>>>>,
    /// Last scene received, if any.
    pub scene: Arc<RwLock<Option<Value>>>,
    /// Directory holding `current_scene.json`.
    pub scenes_dir: PathBuf,
}

impl AppState {
    #[must_use]
    pub fn new(scenes_dir: PathBuf, scene: Option<Value>) -> Self {
        Self { clients: Arc::new(RwLock::new(HashMap::new())), scene: Arc::new(RwLock::new(scene)), scenes_dir }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_has_no_clients() {
        let state = test_helpers::test_app_state();
        assert!(state.clients.read().await.is_empty());
        assert!(state.scene.read().await.is_none());
    }

    #[tokio::test]
    async fn clones_share_the_client_map() {
        let state = test_helpers::test_app_state();
        let copy = state.clone();
        let (id, _rx) = test_helpers::add_client(&state).await;
        assert!(copy.clients.read().await.contains_key(&id));
    }
}
