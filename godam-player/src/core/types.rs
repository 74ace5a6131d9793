//! GoDAM Player Core Type Definitions
//!
//! Identifiers and protocol constants shared across the crate.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Command name without the namespace prefix (e.g. `getCurrentTime`)
pub type CommandName = String;

/// Event name as published by the embedded player (e.g. `timeupdate`)
pub type EventName = String;

/// Opaque tag linking an outbound command to its inbound response.
///
/// Formatted as `godam_<sequence>_<unix millis>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Builds an id from a sequence number and a millisecond timestamp
    pub fn new(sequence: u64, timestamp_ms: i64) -> Self {
        Self(format!("{ID_PREFIX}{sequence}_{timestamp_ms}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Protocol Constants
// =============================================================================

/// Namespace prefix on every message `type`
pub const MESSAGE_NAMESPACE: &str = "godam:";

/// Suffix marking a correlated failure response
pub const ERROR_SUFFIX: &str = ":error";

/// Prefix of generated correlation ids
pub const ID_PREFIX: &str = "godam_";

/// Target origin used when posting to the iframe
pub const POST_TARGET_ORIGIN: &str = "*";

/// Wildcard origin pattern accepting every sender
pub const ANY_ORIGIN: &str = "*";

/// Default per-command response timeout
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Fallback text for `:error` responses without a `message`
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
