//! GoDAM Player Core
//!
//! Protocol-independent building blocks of the remote-control client:
//! errors, identifiers, configuration, origin filtering, the pending request
//! table, the readiness signal and platform timers.

pub mod origin;
pub mod pending;
pub mod readiness;
pub mod settings;
pub mod timer;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
