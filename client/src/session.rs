//! Session glue between the transport channel and the scene engine.
//!
//! DESIGN
//! ======
//! A `Session` owns one [`SceneStore`] and one [`EngineCore`]. Inbound
//! messages from the [`Channel`] are routed into the store (snapshots), the
//! engine (highlights), or the viewer flags (blank/rotate). Host input goes
//! through the engine; the resulting commits go to the store, which sends
//! them on the channel.
//!
//! Locks are always taken store first, then engine. Channel listeners run
//! without the channel's own lock held, so a listener may lock the store
//! while the host is inside a commit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use canvas::consts::RENAME_RECHECK_DELAY;
use canvas::doc::{MapId, Scene};
use canvas::engine::{Action, EngineCore};
use canvas::grid::Point;
use canvas::input::{Button, Key, Modifiers, Target, UiState, WheelDelta};
use canvas::store::{ApplyOutcome, Outbound, SceneStore};
use frames::{ConnectionStatus, Message};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::net::channel::{Channel, Subscription};

impl Outbound for Channel {
    fn send(&self, message: Message) {
        Channel::send(self, message);
    }
}

/// Viewer display flags driven by admin broadcasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerState {
    pub blanked: bool,
    pub rotated: bool,
}

impl ViewerState {
    /// Fold a viewer-control message in. Returns whether it was one.
    pub fn apply(&mut self, message: &Message) -> bool {
        match message {
            Message::BlankViewer => self.blanked = true,
            Message::UnblankViewer => self.blanked = false,
            Message::RotateViewer => self.rotated = true,
            Message::UnrotateViewer => self.rotated = false,
            _ => return false,
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    store: Mutex<SceneStore>,
    engine: Mutex<EngineCore>,
    viewer: Mutex<ViewerState>,
    status: Mutex<ConnectionStatus>,
    /// Bumped every time a remote snapshot is applied.
    applied: watch::Sender<u64>,
}

impl Shared {
    fn handle_inbound(&self, message: &Message) {
        match message {
            Message::ConnectionStatus { status } => {
                *lock(&self.status) = *status;
            }
            Message::SceneUpdate { scene } => match Scene::from_value(scene.clone()) {
                Ok(remote) => {
                    if lock(&self.store).apply_incoming(remote) == ApplyOutcome::Applied {
                        self.applied.send_modify(|n| *n += 1);
                    }
                }
                Err(e) => warn!(error = %e, "session: scene_update payload is not a scene"),
            },
            Message::HighlightMarker { marker_id } => {
                lock(&self.engine).on_highlight(marker_id, Instant::now());
            }
            Message::BlankViewer | Message::UnblankViewer | Message::RotateViewer | Message::UnrotateViewer => {
                let mut viewer = lock(&self.viewer);
                viewer.apply(message);
                info!(blanked = viewer.blanked, rotated = viewer.rotated, "session: viewer state");
            }
            Message::RequestSceneUpdate | Message::Unknown => {
                debug!(kind = message.kind(), "session: ignoring message");
            }
        }
    }
}

pub struct Session {
    channel: Channel,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Wire a store and engine to `channel`. Nothing connects until
    /// [`Session::start`].
    #[must_use]
    pub fn new(channel: Channel, initial: Scene, ui: UiState) -> Self {
        let store = SceneStore::new(initial, Arc::new(channel.clone()));
        let (applied, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            store: Mutex::new(store),
            engine: Mutex::new(EngineCore::new(ui)),
            viewer: Mutex::new(ViewerState::default()),
            status: Mutex::new(ConnectionStatus::Disconnected),
            applied,
        });
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = channel.add_listener(move |message| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_inbound(message);
            }
        });
        Self { channel, shared, subscription: Mutex::new(Some(subscription)), timers: Mutex::new(Vec::new()) }
    }

    pub fn start(&self) {
        self.channel.connect();
    }

    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Last status the channel reported.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *lock(&self.shared.status)
    }

    #[must_use]
    pub fn viewer(&self) -> ViewerState {
        *lock(&self.shared.viewer)
    }

    /// Committed scene.
    #[must_use]
    pub fn scene(&self) -> Scene {
        lock(&self.shared.store).scene().clone()
    }

    /// What to draw: the live drag preview if any, else the committed scene.
    #[must_use]
    pub fn display_scene(&self) -> Scene {
        let store = lock(&self.shared.store);
        let engine = lock(&self.shared.engine);
        engine.display_scene(store.scene()).clone()
    }

    #[must_use]
    pub fn is_highlighted(&self, marker_id: &str) -> bool {
        lock(&self.shared.engine).is_highlighted(marker_id, Instant::now())
    }

    /// Run `edit` against the store. Store mutations commit and send on
    /// their own.
    pub fn with_store<R>(&self, edit: impl FnOnce(&mut SceneStore) -> R) -> R {
        edit(&mut *lock(&self.shared.store))
    }

    /// Rename a map and schedule the delayed re-send check. Must be called
    /// from within a tokio runtime.
    pub fn rename_map(&self, from: &str, to: &str) -> bool {
        if !self.with_store(|store| store.rename_map(from, to)) {
            return false;
        }
        let shared = Arc::downgrade(&self.shared);
        let recheck = tokio::spawn(async move {
            tokio::time::sleep(RENAME_RECHECK_DELAY).await;
            if let Some(shared) = shared.upgrade() {
                lock(&shared.store).recheck_pending_rename();
            }
        });
        let mut timers = lock(&self.timers);
        timers.retain(|timer| !timer.is_finished());
        timers.push(recheck);
        true
    }

    /// Wait until a remote snapshot has been applied, up to `limit`.
    pub async fn wait_for_scene(&self, limit: Duration) -> Option<Scene> {
        let mut applied = self.shared.applied.subscribe();
        if *applied.borrow_and_update() > 0 {
            return Some(self.scene());
        }
        match tokio::time::timeout(limit, applied.changed()).await {
            Ok(Ok(())) => Some(self.scene()),
            _ => None,
        }
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// `map_hit` is the map image under the pointer, if the host found one;
    /// entities drawn above maps take precedence.
    pub fn pointer_down(&self, pt: Point, button: Button, modifiers: Modifiers, map_hit: Option<MapId>) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            let mut engine = lock(&self.shared.engine);
            let target = match engine.target_at(store.scene(), pt) {
                Target::None => map_hit.map_or(Target::None, Target::Map),
                hit => hit,
            };
            engine.on_pointer_down(store.scene(), target, pt, button, modifiers)
        };
        self.route(actions)
    }

    pub fn pointer_move(&self, pt: Point) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            lock(&self.shared.engine).on_pointer_move(store.scene(), pt, Instant::now())
        };
        self.route(actions)
    }

    pub fn pointer_up(&self, pt: Point) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            lock(&self.shared.engine).on_pointer_up(store.scene(), pt)
        };
        self.route(actions)
    }

    pub fn key_down(&self, key: &Key) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            lock(&self.shared.engine).on_key_down(store.scene(), key)
        };
        self.route(actions)
    }

    pub fn wheel(&self, pt: Point, delta: WheelDelta, modifiers: Modifiers) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            let mut engine = lock(&self.shared.engine);
            let target = engine.target_at(store.scene(), pt);
            engine.on_wheel(store.scene(), &target, delta, modifiers, Instant::now())
        };
        self.route(actions)
    }

    pub fn double_click(&self, pt: Point) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            let mut engine = lock(&self.shared.engine);
            let target = engine.target_at(store.scene(), pt);
            engine.on_double_click(store.scene(), &target, pt)
        };
        self.route(actions)
    }

    pub fn set_viewport(&self, width: f64, height: f64) -> Vec<Action> {
        let actions = lock(&self.shared.engine).set_viewport(width, height);
        self.route(actions)
    }

    /// Call once per display frame: releases throttled drag updates and
    /// expires timers.
    pub fn frame(&self) -> Vec<Action> {
        let actions = {
            let store = lock(&self.shared.store);
            lock(&self.shared.engine).on_frame(store.scene(), Instant::now())
        };
        self.route(actions)
    }

    /// Perform commits and sends; hand presentation actions back to the host.
    fn route(&self, actions: Vec<Action>) -> Vec<Action> {
        let mut presentation = Vec::new();
        for action in actions {
            match action {
                Action::Commit(scene) => lock(&self.shared.store).commit_local(*scene),
                Action::Send(message) => self.channel.send(message),
                other => presentation.push(other),
            }
        }
        presentation
    }

    /// Stop listening, cancel every timer, and close the channel.
    pub fn shutdown(&self) {
        self.detach();
        self.channel.disconnect();
    }

    /// [`Session::shutdown`], waiting until everything already handed to
    /// the socket has been written.
    pub async fn close(&self) {
        self.detach();
        self.channel.close().await;
    }

    fn detach(&self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
        for timer in lock(&self.timers).drain(..) {
            timer.abort();
        }
        lock(&self.shared.engine).teardown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
