use std::path::{Path, PathBuf};
use std::time::Duration;

use canvas::doc::Scene;
use canvas::input::UiState;
use clap::{Parser, Subcommand, ValueEnum};
use client::net::channel::DEFAULT_WS_URL;
use client::{Channel, ChannelConfig, MapLibrary, Session, Subscription};
use frames::{ConnectionStatus, Message};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not reach {url}; gave up after {attempts} retries")]
    ConnectFailed { url: String, attempts: u32 },
    #[error("timed out waiting for the relay")]
    Timeout,
    #[error("relay sent no scene")]
    NoScene,
    #[error("scene has no initiative order to step through")]
    NoTurnOrder,
    #[error("{0} message(s) were not delivered before the connection closed")]
    Undelivered(usize),
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid scene document: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("no map library configured; pass --api-url or set SCENESYNC_API_URL")]
    NoApiUrl,
    #[error("map library request failed: {0}")]
    Api(#[from] client::ApiError),
}

#[derive(Parser, Debug)]
#[command(name = "scenesync-cli", about = "Scene relay websocket and map library CLI")]
struct Cli {
    #[arg(long, env = "SCENESYNC_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// Base URL of the map library service. The relay does not serve
    /// `/maps`, so `maps` needs this set explicitly.
    #[arg(long, env = "SCENESYNC_API_URL")]
    api_url: Option<String>,

    /// Seconds to wait for the relay before giving up.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every inbound message and status change as JSON lines.
    Watch,
    /// Replace the shared scene with the contents of a file.
    Push { path: PathBuf },
    /// Blank, unblank, rotate, or unrotate every viewer.
    Viewer {
        #[arg(value_enum)]
        action: ViewerAction,
    },
    /// Highlight a marker on every viewer.
    Highlight { marker_id: String },
    /// Move the turn pointer of the shared initiative order.
    Turn {
        #[arg(value_enum)]
        direction: TurnDirection,
    },
    /// List the map library.
    Maps,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ViewerAction {
    Blank,
    Unblank,
    Rotate,
    Unrotate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TurnDirection {
    Next,
    Prev,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let limit = Duration::from_secs(cli.timeout);

    match cli.command {
        Command::Watch => run_watch(&cli.ws_url).await,
        Command::Push { path } => run_push(&cli.ws_url, &path, limit).await,
        Command::Viewer { action } => run_send(&cli.ws_url, viewer_message(action), limit).await,
        Command::Highlight { marker_id } => {
            run_send(&cli.ws_url, Message::HighlightMarker { marker_id }, limit).await
        }
        Command::Turn { direction } => run_turn(&cli.ws_url, direction, limit).await,
        Command::Maps => run_maps(cli.api_url.as_deref()).await,
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_watch(url: &str) -> Result<(), CliError> {
    let mut conn = Connection::open(url);
    loop {
        tokio::select! {
            message = conn.inbox.recv() => {
                let Some(message) = message else { return Ok(()) };
                println!("{}", serde_json::to_string(&message)?);
                if message == Message::status(ConnectionStatus::Failed) {
                    return Err(conn.failed());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    debug!(error = %e, "cli: ctrl-c handler unavailable");
                }
                conn.channel.close().await;
                return Ok(());
            }
        }
    }
}

async fn run_push(url: &str, path: &Path, limit: Duration) -> Result<(), CliError> {
    let scene = read_scene(path)?;
    let mut conn = Connection::open(url);
    conn.connected(limit).await?;
    conn.channel.send(Message::scene_update(scene.clone()));

    // The relay echoes an accepted update back to its sender. The greeting
    // snapshot sent on connect is skipped by comparing contents.
    let echoed = Message::scene_update(scene);
    conn.until(limit, |message| *message == echoed).await?;
    conn.finish().await
}

async fn run_send(url: &str, message: Message, limit: Duration) -> Result<(), CliError> {
    let mut conn = Connection::open(url);
    conn.connected(limit).await?;
    conn.channel.send(message);
    conn.finish().await
}

async fn run_turn(url: &str, direction: TurnDirection, limit: Duration) -> Result<(), CliError> {
    let channel = Channel::websocket(channel_config(url));
    let session = Session::new(channel, Scene::new("", ""), UiState { is_admin: true, is_active: true });
    session.start();

    let outcome = step_turn(&session, direction, limit).await;
    session.close().await;
    let current = outcome?;

    let queued = session.channel().queued();
    if queued > 0 {
        return Err(CliError::Undelivered(queued));
    }
    print_json(&serde_json::json!({ "current": current }))
}

async fn run_maps(api_url: Option<&str>) -> Result<(), CliError> {
    let maps = MapLibrary::new(library_url(api_url)?).list_maps().await?;
    print_json(&serde_json::to_value(maps)?)
}

// =============================================================================
// CONNECTION
// =============================================================================

/// A channel plus an inbox fed by its listener.
struct Connection {
    url: String,
    channel: Channel,
    inbox: mpsc::UnboundedReceiver<Message>,
    _subscription: Subscription,
}

impl Connection {
    fn open(url: &str) -> Self {
        let channel = Channel::websocket(channel_config(url));
        let (tx, inbox) = mpsc::unbounded_channel();
        let subscription = channel.add_listener(move |message| {
            if tx.send(message.clone()).is_err() {
                debug!("cli: inbox closed");
            }
        });
        channel.connect();
        Self { url: url.to_owned(), channel, inbox, _subscription: subscription }
    }

    fn failed(&self) -> CliError {
        CliError::ConnectFailed { url: self.url.clone(), attempts: self.channel.attempt() }
    }

    async fn connected(&mut self, limit: Duration) -> Result<(), CliError> {
        self.until(limit, |message| *message == Message::status(ConnectionStatus::Connected)).await
    }

    /// Wait for the first message matching `wanted`. A terminal `failed`
    /// status ends the wait early.
    async fn until(&mut self, limit: Duration, wanted: impl Fn(&Message) -> bool) -> Result<(), CliError> {
        let wait = async {
            while let Some(message) = self.inbox.recv().await {
                if wanted(&message) {
                    return Ok(());
                }
                if message == Message::status(ConnectionStatus::Failed) {
                    return Err(self.failed());
                }
            }
            Err(self.failed())
        };
        tokio::time::timeout(limit, wait).await.map_err(|_| CliError::Timeout)?
    }

    /// Close once everything handed to the socket is written.
    async fn finish(self) -> Result<(), CliError> {
        self.channel.close().await;
        match self.channel.queued() {
            0 => Ok(()),
            queued => Err(CliError::Undelivered(queued)),
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn channel_config(url: &str) -> ChannelConfig {
    ChannelConfig { url: url.to_owned(), ..ChannelConfig::default() }
}

fn library_url(api_url: Option<&str>) -> Result<&str, CliError> {
    api_url.filter(|url| !url.trim().is_empty()).ok_or(CliError::NoApiUrl)
}

fn viewer_message(action: ViewerAction) -> Message {
    match action {
        ViewerAction::Blank => Message::BlankViewer,
        ViewerAction::Unblank => Message::UnblankViewer,
        ViewerAction::Rotate => Message::RotateViewer,
        ViewerAction::Unrotate => Message::UnrotateViewer,
    }
}

/// Load a scene file. The document is checked against the scene shape but
/// sent verbatim, so fields this tool does not know survive.
fn read_scene(path: &Path) -> Result<Value, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_owned(), source })?;
    parse_scene(&raw)
}

fn parse_scene(raw: &str) -> Result<Value, CliError> {
    let value = serde_json::from_str::<Value>(raw)?;
    Scene::from_value(value.clone())?;
    Ok(value)
}

/// Wait for the relay's scene, move the turn pointer, and return the name of
/// whoever is up.
async fn step_turn(session: &Session, direction: TurnDirection, limit: Duration) -> Result<String, CliError> {
    if session.wait_for_scene(limit).await.is_none() {
        return Err(CliError::NoScene);
    }
    let moved = session.with_store(|store| match direction {
        TurnDirection::Next => store.advance_turn(),
        TurnDirection::Prev => store.retreat_turn(),
    });
    if !moved {
        return Err(CliError::NoTurnOrder);
    }
    current_turn(&session.scene()).ok_or(CliError::NoTurnOrder)
}

fn current_turn(scene: &Scene) -> Option<String> {
    scene.initiative_order.iter().find(|entry| entry.is_current_turn).map(|entry| entry.name.clone())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
