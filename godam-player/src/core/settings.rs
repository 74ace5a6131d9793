//! Client Options
//!
//! Configuration accepted by the remote-control client:
//! - Origin allowlist for inbound messages (defaults to `*`)
//! - Debug log gating
//! - Per-command response timeout
//!
//! Options deserialize from the same camelCase JSON shape page authors pass
//! to the JavaScript constructor, e.g. `{"allowedOrigins": ["*.example.com"]}`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClientResult, ANY_ORIGIN, DEFAULT_COMMAND_TIMEOUT_MS};

/// Lower bound for `command_timeout_ms`
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 100;

/// Upper bound for `command_timeout_ms`
pub const MAX_COMMAND_TIMEOUT_MS: u64 = 120_000;

/// Remote-control client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Origins allowed to send messages to the client.
    ///
    /// Exact origins (`https://player.example.com`), leading-wildcard
    /// patterns (`*.example.com`) or `*`. The `*` default accepts every
    /// origin; pages embedding players across a trust boundary must narrow it.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Emit diagnostic `debug!` output for filtered messages and lifecycle steps
    #[serde(default)]
    pub enable_debug_logs: bool,

    /// Milliseconds to wait for a correlated response
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec![ANY_ORIGIN.to_string()]
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            enable_debug_logs: false,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl ClientOptions {
    /// Options accepting only the given origins
    pub fn with_allowed_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Self::default()
        };
        options.normalize();
        options
    }

    pub fn with_debug_logs(mut self, enabled: bool) -> Self {
        self.enable_debug_logs = enabled;
        self
    }

    pub fn with_command_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.command_timeout_ms = timeout_ms;
        self.normalize();
        self
    }

    /// Drops blank and duplicate origins (an empty list becomes `*`) and
    /// clamps the timeout.
    pub fn normalize(&mut self) {
        let mut origins: Vec<String> = Vec::with_capacity(self.allowed_origins.len());
        for origin in &self.allowed_origins {
            let trimmed = origin.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            if !origins.iter().any(|o| o == trimmed) {
                origins.push(trimmed.to_string());
            }
        }
        if origins.is_empty() {
            origins = default_allowed_origins();
        }
        self.allowed_origins = origins;

        self.command_timeout_ms = self
            .command_timeout_ms
            .clamp(MIN_COMMAND_TIMEOUT_MS, MAX_COMMAND_TIMEOUT_MS);
    }

    /// Whether the configuration accepts every origin
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == ANY_ORIGIN)
    }

    /// Parses and normalizes options from JSON
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let mut options: ClientOptions = serde_json::from_str(json)?;
        options.normalize();
        Ok(options)
    }

    /// Loads options from a JSON file
    pub fn load_from_file(path: &Path) -> ClientResult<Self> {
        let content = fs::read_to_string(path)?;
        let options = Self::from_json_str(&content)?;
        info!("Loaded player client options from {}", path.display());
        Ok(options)
    }
}
