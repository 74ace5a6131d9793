//! GoDAM Player Remote-Control SDK
//!
//! Promise-style remote control for a GoDAM video player embedded in an
//! iframe. The host page posts `godam:<command>` messages to the player's
//! window and receives correlated responses plus `ready`/`event` broadcasts.
//!
//! ## Layout
//!
//! - [`core`]: errors, identifiers, options, origin filtering, pending
//!   request bookkeeping, readiness and timers
//! - [`ipc`]: wire envelopes, the event bus and the transport traits with an
//!   in-memory implementation (and a `web-sys` one on wasm32)
//! - [`client`]: [`RemoteControlClient`], the public control surface
//!
//! ## Trust
//!
//! The default `allowedOrigins` of `*` accepts messages from any origin.
//! Pages that embed players from a different trust domain should pass an
//! explicit allowlist.

pub mod client;
pub mod core;
pub mod ipc;

pub use crate::client::{CommandFuture, RemoteControlClient};
pub use crate::core::settings::ClientOptions;
pub use crate::core::{ClientError, ClientResult};
pub use crate::ipc::Listener;
