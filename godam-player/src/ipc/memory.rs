//! In-Process Transport
//!
//! A host window, iframe and content window living entirely in memory.
//! Posted messages are recorded instead of delivered, and inbound messages
//! are injected with [`MemoryHost::dispatch`]. Used by tests and by the CLI
//! loopback simulation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use super::transport::{
    ContentWindow, FrameElement, HostWindow, InboundMessage, ListenerId, MessageHandler,
};
use crate::core::{ClientError, ClientResult};

// =============================================================================
// Host Window
// =============================================================================

#[derive(Default)]
struct HostState {
    elements: HashMap<String, Rc<dyn FrameElement>>,
    listeners: Vec<(ListenerId, MessageHandler)>,
    next_listener: u64,
}

/// In-memory host page window. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Rc<RefCell<HostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `element` resolvable through `selector`
    pub fn insert_element(&self, selector: &str, element: Rc<dyn FrameElement>) {
        self.state
            .borrow_mut()
            .elements
            .insert(selector.to_string(), element);
    }

    /// Delivers a `message` event to every registered listener.
    ///
    /// Returns the number of listeners notified.
    pub fn dispatch(&self, origin: &str, data: Value) -> usize {
        let listeners: Vec<MessageHandler> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        let message = InboundMessage::new(origin, data);
        for handler in &listeners {
            handler(&message);
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }
}

impl HostWindow for MemoryHost {
    fn query_selector(&self, selector: &str) -> Option<Rc<dyn FrameElement>> {
        self.state.borrow().elements.get(selector).cloned()
    }

    fn add_message_listener(&self, handler: MessageHandler) -> ListenerId {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push((id, handler));
        id
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.state
            .borrow_mut()
            .listeners
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

// =============================================================================
// Frame Element
// =============================================================================

/// In-memory element; an iframe unless built with [`MemoryFrame::with_tag`]
pub struct MemoryFrame {
    tag: String,
    window: RefCell<Option<Rc<MemoryContentWindow>>>,
    load_callbacks: RefCell<Vec<Box<dyn Fn()>>>,
}

impl MemoryFrame {
    /// A loaded iframe
    pub fn iframe() -> Rc<Self> {
        Rc::new(Self {
            tag: "IFRAME".to_string(),
            window: RefCell::new(Some(Rc::new(MemoryContentWindow::new()))),
            load_callbacks: RefCell::new(Vec::new()),
        })
    }

    /// An element with an arbitrary tag and no content window
    pub fn with_tag(tag: &str) -> Rc<Self> {
        Rc::new(Self {
            tag: tag.to_ascii_uppercase(),
            window: RefCell::new(None),
            load_callbacks: RefCell::new(Vec::new()),
        })
    }

    /// The current content window, for inspecting posted messages
    pub fn window(&self) -> Option<Rc<MemoryContentWindow>> {
        self.window.borrow().clone()
    }

    /// Detaches the content window, as during navigation or unload
    pub fn unload(&self) {
        self.window.borrow_mut().take();
    }

    /// Attaches a fresh content window and fires `load` callbacks
    pub fn load(&self) -> Rc<MemoryContentWindow> {
        let window = Rc::new(MemoryContentWindow::new());
        *self.window.borrow_mut() = Some(Rc::clone(&window));
        for callback in self.load_callbacks.borrow().iter() {
            callback();
        }
        window
    }
}

impl FrameElement for MemoryFrame {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn content_window(&self) -> Option<Rc<dyn ContentWindow>> {
        self.window
            .borrow()
            .clone()
            .map(|window| window as Rc<dyn ContentWindow>)
    }

    fn on_load(&self, callback: Box<dyn Fn()>) {
        self.load_callbacks.borrow_mut().push(callback);
    }
}

// =============================================================================
// Content Window
// =============================================================================

/// Records every message posted to the embedded document
#[derive(Debug, Default)]
pub struct MemoryContentWindow {
    posted: RefCell<Vec<Value>>,
    fail_next: RefCell<Option<String>>,
    post_attempts: Cell<usize>,
}

impl MemoryContentWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages posted so far, oldest first
    pub fn posted(&self) -> Vec<Value> {
        self.posted.borrow().clone()
    }

    pub fn last_posted(&self) -> Option<Value> {
        self.posted.borrow().last().cloned()
    }

    /// Removes and returns the recorded messages
    pub fn take_posted(&self) -> Vec<Value> {
        std::mem::take(&mut *self.posted.borrow_mut())
    }

    /// Makes the next `post_message` call fail with `reason`
    pub fn fail_next_post(&self, reason: &str) {
        *self.fail_next.borrow_mut() = Some(reason.to_string());
    }

    /// Number of `post_message` calls, including failed ones
    pub fn post_attempts(&self) -> usize {
        self.post_attempts.get()
    }
}

impl ContentWindow for MemoryContentWindow {
    fn post_message(&self, message: &Value, _target_origin: &str) -> ClientResult<()> {
        self.post_attempts.set(self.post_attempts.get() + 1);
        if let Some(reason) = self.fail_next.borrow_mut().take() {
            return Err(ClientError::Transport(reason));
        }
        self.posted.borrow_mut().push(message.clone());
        Ok(())
    }
}
