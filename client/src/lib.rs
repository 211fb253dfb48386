//! Native client for the live scene session.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net::channel` keeps one websocket alive (reconnect, backoff, FIFO queue)
//! and fans inbound messages out to listeners. `session` subscribes to the
//! channel and routes messages into the `canvas` scene store and interaction
//! engine, and routes the engine's actions back out. `net::api` talks to the
//! map library over HTTP.

pub mod net;
pub mod session;

pub use net::api::{ApiError, MapLibrary, MapListing};
pub use net::channel::{
    BackoffStrategy, Channel, ChannelConfig, Connector, Link, ReconnectPolicy, Subscription, TransportError,
    WsConnector,
};
pub use session::{Session, ViewerState};
