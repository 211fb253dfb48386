//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! `relay` owns client registration and fan-out; `scene` owns the on-disk
//! copy of the current scene. Route handlers stay focused on protocol
//! translation.

pub mod relay;
pub mod scene;
