//! Readiness Signal
//!
//! Single-resolution signal flipped by the first `ready` broadcast from the
//! embedded player. Every waiter, early or late, observes the same payload.

use std::future::Future;

use serde_json::Value;
use tokio::sync::watch;

use super::{ClientError, ClientResult};

#[derive(Debug)]
pub struct ReadinessSignal {
    state: watch::Sender<Option<Value>>,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Payload of the first `ready` broadcast, once received
    pub fn payload(&self) -> Option<Value> {
        self.state.borrow().clone()
    }

    /// Settles the signal. Returns `true` only for the first call.
    pub fn mark_ready(&self, payload: Value) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(payload);
            true
        })
    }

    /// Resolves with the first `ready` payload.
    ///
    /// Fails with [`ClientError::Destroyed`] if the owning client is dropped
    /// before the player became ready.
    pub fn wait(&self) -> impl Future<Output = ClientResult<Value>> + 'static {
        let mut receiver = self.state.subscribe();
        async move {
            let state = receiver
                .wait_for(Option::is_some)
                .await
                .map_err(|_| ClientError::Destroyed)?;
            Ok(state.clone().unwrap_or(Value::Null))
        }
    }
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}
