//! Shared message model and line codec for the realtime scene transport.
//!
//! This crate owns the wire representation used by both the relay server and
//! the client. Every message is a JSON object with a `type` discriminator; on
//! byte streams messages are newline-delimited. Scene payloads are kept
//! flexible (`serde_json::Value`) so the relay never needs the document model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by the encode/decode helpers.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be parsed as a JSON message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    /// Local-only messages never travel over the wire.
    #[error("message type `{0}` is local-only")]
    LocalOnly(&'static str),
}

/// Lifecycle status of the transport, surfaced to listeners as a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Socket is open and the outbound queue has been handed to the writer.
    Connected,
    /// A connection attempt is in flight.
    Connecting,
    /// Closed, either intentionally or while waiting for the next retry.
    #[default]
    Disconnected,
    /// The last attempt or the live socket failed; a retry may follow.
    Error,
    /// Retries are exhausted. Only an explicit `connect()` leaves this state.
    Failed,
}

/// A single message on the realtime protocol.
///
/// Unrecognized `type` values decode to [`Message::Unknown`] so listeners can
/// ignore them instead of treating them as errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Full-document replace. Sent in both directions.
    SceneUpdate {
        /// The complete serialized scene.
        scene: Value,
    },
    /// Synthetic status event generated by the transport for its listeners.
    ConnectionStatus {
        /// New transport status.
        status: ConnectionStatus,
    },
    /// Ask viewers to flash a marker.
    #[serde(rename_all = "camelCase")]
    HighlightMarker {
        /// Id of the marker to highlight.
        marker_id: String,
    },
    /// Hide the scene on viewers.
    BlankViewer,
    /// Show the scene on viewers again.
    UnblankViewer,
    /// Rotate viewer displays by 180 degrees.
    RotateViewer,
    /// Undo [`Message::RotateViewer`].
    UnrotateViewer,
    /// Viewer-initiated resync, answered with the current scene.
    RequestSceneUpdate,
    /// Any `type` this build does not know about.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Build a `scene_update` message.
    #[must_use]
    pub fn scene_update(scene: Value) -> Self {
        Self::SceneUpdate { scene }
    }

    /// Build a `connection_status` event.
    #[must_use]
    pub fn status(status: ConnectionStatus) -> Self {
        Self::ConnectionStatus { status }
    }

    /// The wire `type` discriminator for this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SceneUpdate { .. } => "scene_update",
            Self::ConnectionStatus { .. } => "connection_status",
            Self::HighlightMarker { .. } => "highlight_marker",
            Self::BlankViewer => "blank_viewer",
            Self::UnblankViewer => "unblank_viewer",
            Self::RotateViewer => "rotate_viewer",
            Self::UnrotateViewer => "unrotate_viewer",
            Self::RequestSceneUpdate => "request_scene_update",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this message is generated locally and must never be sent.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        matches!(self, Self::ConnectionStatus { .. } | Self::Unknown)
    }
}

/// Encode a message as a single compact JSON object (no trailing newline).
///
/// # Errors
///
/// Returns [`CodecError::LocalOnly`] for local-only messages and
/// [`CodecError::Encode`] if serialization fails.
pub fn encode_message(message: &Message) -> Result<String, CodecError> {
    if message.is_local_only() {
        return Err(CodecError::LocalOnly(message.kind()));
    }
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Encode a message as one NDJSON line, newline included.
///
/// # Errors
///
/// See [`encode_message`].
pub fn encode_line(message: &Message) -> Result<String, CodecError> {
    let mut line = encode_message(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode a single JSON message.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON or a missing `type`.
pub fn decode_message(text: &str) -> Result<Message, CodecError> {
    serde_json::from_str(text.trim()).map_err(CodecError::Decode)
}

/// Decode every newline-delimited message in `buffer`.
///
/// Blank lines are skipped. Each line yields its own result, so one malformed
/// line never hides the messages around it.
#[must_use]
pub fn decode_lines(buffer: &str) -> Vec<Result<Message, CodecError>> {
    buffer
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(decode_message)
        .collect()
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
