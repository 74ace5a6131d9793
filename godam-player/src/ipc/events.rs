//! Player Event Bus
//!
//! Local pub/sub for broadcasts received from the embedded player.
//! Listeners for an event run in registration order; a panicking listener is
//! logged and skipped so the remaining listeners still receive the event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde_json::Value;

// =============================================================================
// Event Names
// =============================================================================

/// Event names commonly published by the player frame
pub mod event_names {
    /// Player finished initializing (local mirror of the `ready` handshake)
    pub const READY: &str = "ready";
    /// Playback position changed
    pub const TIME_UPDATE: &str = "timeupdate";
    /// Playback started
    pub const PLAY: &str = "play";
    /// Playback paused
    pub const PAUSE: &str = "pause";
    /// Playback reached the end of the media
    pub const ENDED: &str = "ended";
    /// Volume or mute state changed
    pub const VOLUME_CHANGE: &str = "volumechange";
    /// Seek completed
    pub const SEEKED: &str = "seeked";
}

// =============================================================================
// Listener
// =============================================================================

/// Callback registered for a player event.
///
/// Identity is the allocation: clones of one `Listener` compare equal for
/// [`EventBus::unsubscribe`], separately constructed listeners never do.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Value)>);

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        Self(Rc::new(callback))
    }

    pub fn same_as(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Invokes the callback, converting a panic into an error message
    fn invoke(&self, data: &Value) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.0)(data))).map_err(|cause| {
            cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "listener panicked".to_string())
        })
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event name -> ordered listeners
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: HashMap<String, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener for `event`
    pub fn subscribe(&mut self, event: &str, listener: Listener) {
        self.subscribers
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    /// Removes the first matching listener, or every listener when `listener`
    /// is `None`. Returns how many were removed.
    pub fn unsubscribe(&mut self, event: &str, listener: Option<&Listener>) -> usize {
        let Some(target) = listener else {
            return self.subscribers.remove(event).map_or(0, |removed| removed.len());
        };
        let Some(listeners) = self.subscribers.get_mut(event) else {
            return 0;
        };
        match listeners.iter().position(|l| l.same_as(target)) {
            Some(index) => {
                listeners.remove(index);
                1
            }
            None => 0,
        }
    }

    /// Snapshot of the listeners for `event`, in registration order
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.subscribers.get(event).cloned().unwrap_or_default()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.subscribers.get(event).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

/// Delivers `data` to each listener in order and returns the number of
/// listeners that panicked.
///
/// Takes a snapshot so listeners may (un)subscribe while being notified.
pub fn dispatch(event: &str, listeners: &[Listener], data: &Value) -> usize {
    let mut failures = 0;
    for listener in listeners {
        if let Err(cause) = listener.invoke(data) {
            failures += 1;
            tracing::warn!(event, "Error in event listener for '{}': {}", event, cause);
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> Listener {
        let log = Rc::clone(log);
        let tag = tag.to_string();
        Listener::new(move |data| log.borrow_mut().push(format!("{tag}:{data}")))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe("x", recorder(&log, "f1"));
        bus.subscribe("x", recorder(&log, "f2"));

        dispatch("x", &bus.listeners("x"), &json!(1));

        assert_eq!(*log.borrow(), vec!["f1:1".to_string(), "f2:1".to_string()]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe("x", Listener::new(|_| panic!("boom")));
        bus.subscribe("x", recorder(&log, "f2"));

        let failures = dispatch("x", &bus.listeners("x"), &json!("d"));

        assert_eq!(failures, 1);
        assert_eq!(*log.borrow(), vec!["f2:\"d\"".to_string()]);
    }

    #[test]
    fn test_unsubscribe_removes_first_identical_listener() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let f1 = recorder(&log, "f1");
        let f2 = recorder(&log, "f2");
        bus.subscribe("x", f1.clone());
        bus.subscribe("x", f2.clone());
        bus.subscribe("x", f1.clone());

        assert_eq!(bus.unsubscribe("x", Some(&f1)), 1);
        dispatch("x", &bus.listeners("x"), &json!(0));

        assert_eq!(*log.borrow(), vec!["f2:0".to_string(), "f1:0".to_string()]);
    }

    #[test]
    fn test_unsubscribe_all_and_unknown_event() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe("x", recorder(&log, "a"));
        bus.subscribe("x", recorder(&log, "b"));

        assert_eq!(bus.unsubscribe("x", None), 2);
        assert_eq!(bus.listener_count("x"), 0);
        assert_eq!(bus.unsubscribe("missing", None), 0);
        assert_eq!(bus.unsubscribe("missing", Some(&recorder(&log, "c"))), 0);
    }

    #[test]
    fn test_distinct_listeners_are_not_equal() {
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }
}
