//! Scene engine for the live shared-scene session.
//!
//! This crate holds everything about the shared scene that does not touch a
//! socket: the document model, grid/pixel coordinate transforms, the scene
//! store with its stale-snapshot guard, the turn order state machine, and the
//! drag/edit interaction controller. The host (the `client` crate, or a UI)
//! feeds it pointer events and inbound snapshots and forwards the resulting
//! [`engine::Action`]s and [`store::Outbound`] messages to the transport.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Interaction controller: drags, fog editing, wheel, timers |
//! | [`store`] | Scene store: incoming snapshots, local commits, rename guard |
//! | [`initiative`] | Turn order state machine |
//! | [`doc`] | Scene document and entity types |
//! | [`grid`] | Grid-cell and pixel coordinate transforms |
//! | [`input`] | Input event types and the gesture state machine |
//! | [`hit`] | Hit-testing and polygon geometry |
//! | [`throttle`] | Single-slot rate limiter for drag updates |
//! | [`consts`] | Shared constants (step sizes, timer durations, slop) |

pub mod consts;
pub mod doc;
pub mod engine;
pub mod grid;
pub mod hit;
pub mod initiative;
pub mod input;
pub mod store;
pub mod throttle;
