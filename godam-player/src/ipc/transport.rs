//! Cross-Frame Transport
//!
//! The seams between the client and the browser's window-messaging
//! primitive: the host page window, the player iframe element, and the
//! iframe's content window. `ipc::memory` implements them in-process and
//! `ipc::web` (wasm32) implements them over `web-sys`.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::core::ClientResult;

/// A `message` event received by the host window
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Origin of the sending document
    pub origin: String,
    /// Message data, already converted to JSON
    pub data: Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Handler invoked for every message delivered to the host window
pub type MessageHandler = Rc<dyn Fn(&InboundMessage)>;

/// Registration handle returned by [`HostWindow::add_message_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The window of the iframe's document
pub trait ContentWindow {
    /// Posts a message to the embedded document
    fn post_message(&self, message: &Value, target_origin: &str) -> ClientResult<()>;
}

/// The player iframe element
pub trait FrameElement {
    /// Upper-case tag name, as reported by the DOM (`IFRAME`)
    fn tag_name(&self) -> String;

    /// The iframe's content window, if its document is attached
    fn content_window(&self) -> Option<Rc<dyn ContentWindow>>;

    /// Registers a callback for the frame's `load` event (diagnostics only)
    fn on_load(&self, _callback: Box<dyn Fn()>) {}
}

/// The host page window
pub trait HostWindow {
    /// Resolves a CSS selector to an element
    fn query_selector(&self, selector: &str) -> Option<Rc<dyn FrameElement>>;

    /// Subscribes to the window's `message` events
    fn add_message_listener(&self, handler: MessageHandler) -> ListenerId;

    fn remove_message_listener(&self, id: ListenerId);
}

/// What the client should control: an element, or a selector to resolve
#[derive(Clone)]
pub enum FrameTarget {
    Element(Rc<dyn FrameElement>),
    Selector(String),
}

impl fmt::Debug for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameTarget::Element(element) => f
                .debug_tuple("Element")
                .field(&element.tag_name())
                .finish(),
            FrameTarget::Selector(selector) => f.debug_tuple("Selector").field(selector).finish(),
        }
    }
}

impl From<&str> for FrameTarget {
    fn from(selector: &str) -> Self {
        FrameTarget::Selector(selector.to_string())
    }
}

impl From<String> for FrameTarget {
    fn from(selector: String) -> Self {
        FrameTarget::Selector(selector)
    }
}

impl From<Rc<dyn FrameElement>> for FrameTarget {
    fn from(element: Rc<dyn FrameElement>) -> Self {
        FrameTarget::Element(element)
    }
}
