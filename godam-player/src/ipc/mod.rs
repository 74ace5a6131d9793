//! IPC (Cross-Frame Messaging) Module
//!
//! Handles communication between the host page and the embedded player
//! frame: wire envelopes, local event fan-out and the window-messaging
//! transport.

mod events;
mod payloads;
mod transport;

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use events::*;
pub use payloads::*;
pub use transport::*;
