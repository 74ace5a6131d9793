//! Remote-Control Client
//!
//! Controls a GoDAM player running inside an iframe. Commands are posted to
//! the iframe's content window as `godam:<command>` envelopes tagged with a
//! correlation id; responses are matched back by that id. Uncorrelated
//! broadcasts drive the readiness signal and the local event bus.
//!
//! All state is single-threaded (`Rc`/`RefCell`). No borrow is held while a
//! message is posted or a listener runs, so handlers may call back into the
//! client.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::origin::OriginAllowlist;
use crate::core::pending::{PendingGuard, PendingRequests, Settlement, SharedPending};
use crate::core::readiness::ReadinessSignal;
use crate::core::settings::ClientOptions;
use crate::core::timer::{unix_millis, with_deadline, Deadline};
use crate::core::{ClientError, ClientResult, CorrelationId, POST_TARGET_ORIGIN};
use crate::ipc::{
    dispatch, event_names, CommandArgs, EventBus, FrameElement, FrameTarget, HostWindow,
    InboundEnvelope, InboundKind, InboundMessage, Listener, ListenerId, OutboundEnvelope,
};

/// Future returned by every command; the message has already been posted
/// when the future is created.
pub type CommandFuture<T> = LocalBoxFuture<'static, ClientResult<T>>;

// =============================================================================
// Shared State
// =============================================================================

/// State reachable from both the public API and the inbound message handler
struct ClientShared {
    pending: SharedPending,
    events: RefCell<EventBus>,
    readiness: ReadinessSignal,
    sequence: Cell<u64>,
    destroyed: Cell<bool>,
    allowlist: OriginAllowlist,
    debug_logs: bool,
}

impl ClientShared {
    fn next_correlation_id(&self) -> CorrelationId {
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);
        CorrelationId::new(sequence, unix_millis())
    }

    /// Rejects every pending command whose deadline has passed, whether or
    /// not its future is being polled. Returns how many were expired.
    fn expire_overdue(&self) -> usize {
        let expired = self.pending.borrow_mut().take_expired();
        let count = expired.len();
        for (id, record) in expired {
            debug!(id = %id, command = record.command(), "Command timed out");
            record.expire();
        }
        count
    }

    fn emit(&self, event: &str, data: &Value) {
        let listeners = self.events.borrow().listeners(event);
        dispatch(event, &listeners, data);
    }

    /// Origin filter, shape filter, correlation routing, then broadcasts.
    /// Overdue commands are expired first so a late response finds nothing
    /// to settle.
    fn handle_message(&self, message: &InboundMessage) {
        if self.destroyed.get() {
            return;
        }
        self.expire_overdue();

        if !self.allowlist.is_allowed(&message.origin) {
            if self.debug_logs {
                debug!(origin = %message.origin, "Ignoring message from disallowed origin");
            }
            return;
        }

        let envelope = match InboundEnvelope::decode(&message.data) {
            Ok(envelope) => envelope,
            Err(reason) => {
                if self.debug_logs {
                    debug!(origin = %message.origin, "Ignoring message: {}", reason);
                }
                return;
            }
        };

        if let Some(id) = envelope.id.as_deref() {
            let record = self.pending.borrow_mut().take(id);
            if let Some(record) = record {
                let outcome: Settlement = if envelope.is_failure() {
                    Err(ClientError::CommandFailed {
                        command: record.command().to_string(),
                        message: envelope.failure_message(),
                    })
                } else {
                    Ok(envelope.payload)
                };
                if self.debug_logs {
                    debug!(id, command = record.command(), ok = outcome.is_ok(), "Settled command");
                }
                record.settle(outcome);
                return;
            }
        }

        match envelope.kind {
            InboundKind::Ready => {
                if self.readiness.mark_ready(envelope.payload.clone()) && self.debug_logs {
                    debug!("Player is ready");
                }
                self.emit(event_names::READY, &envelope.payload);
            }
            InboundKind::Event { name, data } => {
                if self.debug_logs {
                    debug!(event = %name, "Player event");
                }
                self.emit(&name, &data);
            }
            InboundKind::Reply { command } | InboundKind::Failure { command } => {
                if self.debug_logs {
                    debug!(
                        id = ?envelope.id,
                        command = %command,
                        "Ignoring response without a pending request"
                    );
                }
            }
            InboundKind::Unrecognized { raw } => {
                if self.debug_logs {
                    debug!(kind = %raw, "Ignoring unrecognized player message");
                }
            }
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// A command that has been posted and is awaiting its response
struct InFlight {
    command: String,
    receiver: oneshot::Receiver<Settlement>,
    guard: PendingGuard,
    deadline: Deadline,
    timeout_ms: u64,
}

/// Remote control for one player iframe
pub struct RemoteControlClient {
    host: Rc<dyn HostWindow>,
    target: Rc<dyn FrameElement>,
    options: ClientOptions,
    shared: Rc<ClientShared>,
    listener: Cell<Option<ListenerId>>,
}

impl RemoteControlClient {
    /// Wraps the iframe identified by `target` and starts listening for its
    /// messages on `host`.
    ///
    /// Fails with [`ClientError::Initialization`] when a selector matches
    /// nothing or the element is not an iframe.
    pub fn new(
        host: Rc<dyn HostWindow>,
        target: impl Into<FrameTarget>,
        mut options: ClientOptions,
    ) -> ClientResult<Self> {
        options.normalize();

        let target = match target.into() {
            FrameTarget::Element(element) => element,
            FrameTarget::Selector(selector) => host.query_selector(&selector).ok_or_else(|| {
                ClientError::Initialization(format!(
                    "No element found for selector \"{}\"",
                    selector
                ))
            })?,
        };
        if !target.tag_name().eq_ignore_ascii_case("iframe") {
            return Err(ClientError::Initialization(format!(
                "Target element must be an iframe, got <{}>",
                target.tag_name().to_ascii_lowercase()
            )));
        }

        let shared = Rc::new(ClientShared {
            pending: PendingRequests::shared(),
            events: RefCell::new(EventBus::new()),
            readiness: ReadinessSignal::new(),
            sequence: Cell::new(0),
            destroyed: Cell::new(false),
            allowlist: OriginAllowlist::new(&options.allowed_origins),
            debug_logs: options.enable_debug_logs,
        });

        let weak: Weak<ClientShared> = Rc::downgrade(&shared);
        let listener = host.add_message_listener(Rc::new(move |message: &InboundMessage| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_message(message);
            }
        }));

        if options.enable_debug_logs {
            target.on_load(Box::new(|| debug!("Player iframe loaded")));
            if options.allows_any_origin() {
                warn!("Accepting player messages from any origin; set allowedOrigins to restrict");
            }
            debug!(origins = ?options.allowed_origins, "Player client initialized");
        }

        Ok(Self {
            host,
            target,
            options,
            shared,
            listener: Cell::new(Some(listener)),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Posts `godam:<command>` and resolves with the response payload.
    ///
    /// The message is sent before this returns. Rejects with
    /// [`ClientError::UnavailableTarget`] if the iframe has no content window,
    /// [`ClientError::CommandTimeout`] if no response arrives in time,
    /// [`ClientError::CommandFailed`] on a `:error` response, and
    /// [`ClientError::Destroyed`] on teardown. Dropping the future releases
    /// the pending request.
    pub fn send_command(&self, command: &str, payload: Value) -> CommandFuture<Value> {
        let in_flight = self.start_command(command, payload);
        async move {
            let InFlight {
                command,
                receiver,
                guard,
                deadline,
                timeout_ms,
            } = in_flight?;
            let _guard = guard;

            match with_deadline(deadline, receiver).await {
                Ok(Ok(settlement)) => settlement,
                Ok(Err(_)) => Err(ClientError::Destroyed),
                Err(_) => {
                    debug!(command = %command, timeout_ms, "Command timed out");
                    Err(ClientError::CommandTimeout {
                        command,
                        timeout_ms,
                    })
                }
            }
        }
        .boxed_local()
    }

    fn start_command(&self, command: &str, payload: Value) -> ClientResult<InFlight> {
        if self.shared.destroyed.get() {
            return Err(ClientError::Destroyed);
        }
        self.shared.expire_overdue();

        let window = self
            .target
            .content_window()
            .ok_or_else(|| ClientError::UnavailableTarget {
                command: command.to_string(),
            })?;

        let id = self.shared.next_correlation_id();
        let envelope = OutboundEnvelope::command(command, payload, id.clone());
        let message = envelope.to_value()?;

        let timeout_ms = self.options.command_timeout_ms;
        let deadline = Deadline::after(Duration::from_millis(timeout_ms));
        let receiver = self.shared.pending.borrow_mut().register(
            id.clone(),
            command,
            deadline,
            timeout_ms,
        )?;
        let guard = PendingGuard::new(&self.shared.pending, id.clone());

        if let Err(err) = window.post_message(&message, POST_TARGET_ORIGIN) {
            warn!(command = envelope.command_name(), id = %id, "Failed to post command: {}", err);
            return Err(err);
        }
        if self.options.enable_debug_logs {
            debug!(message_type = %envelope.message_type, id = %id, "Sent command");
        }

        Ok(InFlight {
            command: command.to_string(),
            receiver,
            guard,
            deadline,
            timeout_ms,
        })
    }

    /// Sends a command and discards its result payload
    fn command(&self, command: &str, payload: Value) -> CommandFuture<()> {
        self.send_command(command, payload).map(|r| r.map(|_| ())).boxed_local()
    }

    /// Sends a query and extracts `field` from the result payload
    fn query<T: 'static>(
        &self,
        command: &'static str,
        field: &'static str,
        extract: fn(&Value) -> Option<T>,
    ) -> CommandFuture<T> {
        self.send_command(command, json!({}))
            .map(move |result| {
                let payload = result?;
                payload
                    .get(field)
                    .and_then(extract)
                    .ok_or_else(|| ClientError::MalformedResponse {
                        command: command.to_string(),
                        field,
                    })
            })
            .boxed_local()
    }

    pub fn play(&self) -> CommandFuture<()> {
        self.command("play", json!({}))
    }

    pub fn pause(&self) -> CommandFuture<()> {
        self.command("pause", json!({}))
    }

    /// Seeks to `time` seconds. Non-finite times fail before anything is sent.
    pub fn seek(&self, time: f64) -> ClientResult<CommandFuture<()>> {
        if !time.is_finite() {
            return Err(ClientError::Validation("Time must be a number".to_string()));
        }
        Ok(self.command("seek", CommandArgs::Seek { time }.into_value()?))
    }

    pub fn get_current_time(&self) -> CommandFuture<f64> {
        self.query("getCurrentTime", "time", Value::as_f64)
    }

    pub fn get_duration(&self) -> CommandFuture<f64> {
        self.query("getDuration", "duration", Value::as_f64)
    }

    /// Sets the volume. Values outside `[0, 1]` fail before anything is sent.
    pub fn set_volume(&self, volume: f64) -> ClientResult<CommandFuture<()>> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(ClientError::Validation(
                "Volume must be a number between 0 and 1".to_string(),
            ));
        }
        Ok(self.command("setVolume", CommandArgs::SetVolume { volume }.into_value()?))
    }

    pub fn get_volume(&self) -> CommandFuture<f64> {
        self.query("getVolume", "volume", Value::as_f64)
    }

    pub fn set_muted(&self, muted: bool) -> CommandFuture<()> {
        let payload = CommandArgs::SetMuted { muted }.into_value();
        match payload {
            Ok(payload) => self.command("setMuted", payload),
            Err(err) => futures::future::ready(Err(err)).boxed_local(),
        }
    }

    pub fn get_muted(&self) -> CommandFuture<bool> {
        self.query("getMuted", "muted", Value::as_bool)
    }

    // -------------------------------------------------------------------------
    // Events & readiness
    // -------------------------------------------------------------------------

    /// Subscribes `listener` to `event`. Returns `self` for chaining.
    pub fn on(&self, event: &str, listener: Listener) -> &Self {
        if self.shared.destroyed.get() {
            return self;
        }
        self.shared.events.borrow_mut().subscribe(event, listener);
        self
    }

    /// Removes `listener` from `event`, or every listener when `None`
    pub fn off(&self, event: &str, listener: Option<&Listener>) -> &Self {
        self.shared
            .events
            .borrow_mut()
            .unsubscribe(event, listener);
        self
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.events.borrow().listener_count(event)
    }

    /// Resolves with the payload of the first `ready` broadcast, including
    /// when called after the player is already ready.
    pub fn ready(&self) -> impl Future<Output = ClientResult<Value>> + 'static {
        self.shared.readiness.wait()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.readiness.is_ready()
    }

    // -------------------------------------------------------------------------
    // Diagnostics & teardown
    // -------------------------------------------------------------------------

    /// Number of commands still awaiting a response. Overdue commands are
    /// expired before counting.
    pub fn pending_count(&self) -> usize {
        self.shared.expire_overdue();
        self.shared.pending.borrow().len()
    }

    pub fn pending_ids(&self) -> Vec<CorrelationId> {
        self.shared.expire_overdue();
        self.shared.pending.borrow().ids()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.get()
    }

    /// Rejects pending commands with [`ClientError::Destroyed`], drops all
    /// subscribers and stops listening for messages. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.replace(true) {
            return;
        }

        if let Some(listener) = self.listener.take() {
            self.host.remove_message_listener(listener);
        }

        let pending = self.shared.pending.borrow_mut().drain();
        let rejected = pending.len();
        for (_, record) in pending {
            record.settle(Err(ClientError::Destroyed));
        }
        self.shared.events.borrow_mut().clear();

        if self.options.enable_debug_logs {
            debug!(rejected, "Player client destroyed");
        }
    }
}

impl Drop for RemoteControlClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RemoteControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteControlClient")
            .field("options", &self.options)
            .field("ready", &self.is_ready())
            .field("pending", &self.pending_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
