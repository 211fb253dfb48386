//! Networking: the reconnecting websocket channel and the map-library REST
//! client.

pub mod api;
pub mod channel;
