//! Browser Transport (wasm32)
//!
//! Implements the transport traits over `web-sys` and exports the client to
//! JavaScript as `GodamPlayer`, the conventional entry point for page authors
//! embedding a player iframe.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{Element, HtmlIFrameElement, MessageEvent, Window};

use super::events::Listener;
use super::transport::{
    ContentWindow, FrameElement, FrameTarget, HostWindow, InboundMessage, ListenerId,
    MessageHandler,
};
use crate::client::{CommandFuture, RemoteControlClient};
use crate::core::settings::ClientOptions;
use crate::core::{ClientError, ClientResult};

// =============================================================================
// JSON <-> JsValue
// =============================================================================

fn json_to_js(value: &Value) -> ClientResult<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text)
        .map_err(|e| ClientError::Transport(format!("Failed to convert message: {:?}", e)))
}

/// Structured-clone data that is not JSON-representable becomes `null`
fn js_to_json(value: &JsValue) -> Value {
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|text| text.as_string())
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

fn to_js_error(err: ClientError) -> JsValue {
    JsError::new(&err.to_string()).into()
}

// =============================================================================
// Host Window
// =============================================================================

/// The page's global `window`
pub struct WebHost {
    window: Window,
    listeners: RefCell<HashMap<ListenerId, Closure<dyn FnMut(MessageEvent)>>>,
    next_listener: Cell<u64>,
}

impl WebHost {
    pub fn new() -> ClientResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| ClientError::Initialization("No global window".to_string()))?;
        Ok(Self {
            window,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(0),
        })
    }
}

impl HostWindow for WebHost {
    fn query_selector(&self, selector: &str) -> Option<Rc<dyn FrameElement>> {
        let document = self.window.document()?;
        let element = document.query_selector(selector).ok().flatten()?;
        Some(Rc::new(WebFrame::new(element)))
    }

    fn add_message_listener(&self, handler: MessageHandler) -> ListenerId {
        let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
            let message = InboundMessage::new(event.origin(), js_to_json(&event.data()));
            handler(&message);
        }) as Box<dyn FnMut(MessageEvent)>);

        if let Err(e) = self
            .window
            .add_event_listener_with_callback("message", callback.as_ref().unchecked_ref())
        {
            tracing::warn!("Failed to add message listener: {:?}", e);
        }

        let id = ListenerId(self.next_listener.get() + 1);
        self.next_listener.set(id.0);
        self.listeners.borrow_mut().insert(id, callback);
        id
    }

    fn remove_message_listener(&self, id: ListenerId) {
        let Some(callback) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        let _ = self
            .window
            .remove_event_listener_with_callback("message", callback.as_ref().unchecked_ref());
    }
}

// =============================================================================
// Frame Element
// =============================================================================

struct WebFrame {
    element: Element,
    load_callbacks: RefCell<Vec<Closure<dyn FnMut()>>>,
}

impl WebFrame {
    fn new(element: Element) -> Self {
        Self {
            element,
            load_callbacks: RefCell::new(Vec::new()),
        }
    }
}

impl FrameElement for WebFrame {
    fn tag_name(&self) -> String {
        self.element.tag_name()
    }

    fn content_window(&self) -> Option<Rc<dyn ContentWindow>> {
        let frame = self.element.dyn_ref::<HtmlIFrameElement>()?;
        let window = frame.content_window()?;
        Some(Rc::new(WebContentWindow(window)))
    }

    fn on_load(&self, callback: Box<dyn Fn()>) {
        let closure = Closure::wrap(Box::new(move || callback()) as Box<dyn FnMut()>);
        let _ = self
            .element
            .add_event_listener_with_callback("load", closure.as_ref().unchecked_ref());
        self.load_callbacks.borrow_mut().push(closure);
    }
}

struct WebContentWindow(Window);

impl ContentWindow for WebContentWindow {
    fn post_message(&self, message: &Value, target_origin: &str) -> ClientResult<()> {
        let message = json_to_js(message)?;
        self.0
            .post_message(&message, target_origin)
            .map_err(|e| ClientError::Transport(format!("{:?}", e)))
    }
}

// =============================================================================
// JavaScript API
// =============================================================================

struct PlayerHandle {
    client: RemoteControlClient,
    callbacks: RefCell<Vec<(String, js_sys::Function, Listener)>>,
}

/// `new GodamPlayer(iframeOrSelector, options)`
///
/// Handles returned by `on`/`off` share one client, so calls chain.
#[wasm_bindgen(js_name = GodamPlayer)]
#[derive(Clone)]
pub struct GodamPlayer {
    inner: Rc<PlayerHandle>,
}

fn command_promise<T, F>(future: CommandFuture<T>, convert: F) -> js_sys::Promise
where
    T: 'static,
    F: FnOnce(T) -> JsValue + 'static,
{
    future_to_promise(async move { future.await.map(convert).map_err(to_js_error) })
}

#[wasm_bindgen(js_class = GodamPlayer)]
impl GodamPlayer {
    #[wasm_bindgen(constructor)]
    pub fn new(target: JsValue, options: JsValue) -> Result<GodamPlayer, JsError> {
        let options = if options.is_undefined() || options.is_null() {
            ClientOptions::default()
        } else {
            serde_json::from_value(js_to_json(&options))
                .map_err(|e| JsError::new(&format!("Invalid options: {}", e)))?
        };

        let target = match target.as_string() {
            Some(selector) => FrameTarget::Selector(selector),
            None => {
                let element = target
                    .dyn_into::<Element>()
                    .map_err(|_| JsError::new("Target must be an iframe element or a selector"))?;
                FrameTarget::Element(Rc::new(WebFrame::new(element)))
            }
        };

        let host = WebHost::new().map_err(|e| JsError::new(&e.to_string()))?;
        let client = RemoteControlClient::new(Rc::new(host), target, options)
            .map_err(|e| JsError::new(&e.to_string()))?;

        Ok(Self {
            inner: Rc::new(PlayerHandle {
                client,
                callbacks: RefCell::new(Vec::new()),
            }),
        })
    }

    pub fn ready(&self) -> js_sys::Promise {
        let ready = self.inner.client.ready();
        future_to_promise(async move {
            let payload = ready.await.map_err(to_js_error)?;
            json_to_js(&payload).map_err(to_js_error)
        })
    }

    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.inner.client.is_ready()
    }

    pub fn play(&self) -> js_sys::Promise {
        command_promise(self.inner.client.play(), |_| JsValue::UNDEFINED)
    }

    pub fn pause(&self) -> js_sys::Promise {
        command_promise(self.inner.client.pause(), |_| JsValue::UNDEFINED)
    }

    pub fn seek(&self, time: JsValue) -> Result<js_sys::Promise, JsError> {
        let time = time
            .as_f64()
            .ok_or_else(|| JsError::new("Time must be a number"))?;
        let future = self
            .client
            .seek(time)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(command_promise(future, |_| JsValue::UNDEFINED))
    }

    #[wasm_bindgen(js_name = getCurrentTime)]
    pub fn get_current_time(&self) -> js_sys::Promise {
        command_promise(self.inner.client.get_current_time(), JsValue::from_f64)
    }

    #[wasm_bindgen(js_name = getDuration)]
    pub fn get_duration(&self) -> js_sys::Promise {
        command_promise(self.inner.client.get_duration(), JsValue::from_f64)
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&self, volume: JsValue) -> Result<js_sys::Promise, JsError> {
        let volume = volume
            .as_f64()
            .ok_or_else(|| JsError::new("Volume must be a number between 0 and 1"))?;
        let future = self
            .client
            .set_volume(volume)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(command_promise(future, |_| JsValue::UNDEFINED))
    }

    #[wasm_bindgen(js_name = getVolume)]
    pub fn get_volume(&self) -> js_sys::Promise {
        command_promise(self.inner.client.get_volume(), JsValue::from_f64)
    }

    #[wasm_bindgen(js_name = setMuted)]
    pub fn set_muted(&self, muted: bool) -> js_sys::Promise {
        command_promise(self.inner.client.set_muted(muted), |_| JsValue::UNDEFINED)
    }

    #[wasm_bindgen(js_name = getMuted)]
    pub fn get_muted(&self) -> js_sys::Promise {
        command_promise(self.inner.client.get_muted(), JsValue::from_bool)
    }

    /// Subscribes a JS callback; exceptions it throws are logged and dropped
    pub fn on(&self, event: &str, callback: js_sys::Function) -> GodamPlayer {
        let function = callback.clone();
        let name = event.to_string();
        let listener = Listener::new(move |data| {
            let arg = json_to_js(data).unwrap_or(JsValue::NULL);
            if let Err(e) = function.call1(&JsValue::NULL, &arg) {
                tracing::warn!("Error in event listener for '{}': {:?}", name, e);
            }
        });
        self.inner.client.on(event, listener.clone());
        self.inner
            .callbacks
            .borrow_mut()
            .push((event.to_string(), callback, listener));
        self.clone()
    }

    pub fn off(&self, event: &str, callback: Option<js_sys::Function>) -> GodamPlayer {
        let Some(callback) = callback else {
            self.inner.client.off(event, None);
            self.inner
                .callbacks
                .borrow_mut()
                .retain(|(name, _, _)| name != event);
            return self.clone();
        };

        let target: &JsValue = callback.as_ref();
        let removed = {
            let mut callbacks = self.inner.callbacks.borrow_mut();
            callbacks
                .iter()
                .position(|(name, function, _)| {
                    name == event && AsRef::<JsValue>::as_ref(function) == target
                })
                .map(|index| callbacks.remove(index).2)
        };
        if let Some(listener) = removed {
            self.inner.client.off(event, Some(&listener));
        }
        self.clone()
    }

    pub fn destroy(&self) {
        self.inner.client.destroy();
        self.inner.callbacks.borrow_mut().clear();
    }
}
