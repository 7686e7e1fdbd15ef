//! # Event Router
//!
//! The router is the only place payloads are delivered from. Live feed traffic
//! (through `FeedSink::message`) and injected test events (through
//! `TestHooks::emit`) both end up in `EventRouter::dispatch`.
//!
//! ## Delivery rules:
//!
//! 1.  Every handler registered for a name when `dispatch` starts receives the
//!     payload exactly once, synchronously. Order between handlers is not part
//!     of the contract.
//! 2.  Handlers run without any router lock held, so a handler may register or
//!     unregister handlers (itself included) while being called.
//! 3.  A panicking handler is logged and skipped; delivery continues with the
//!     remaining handlers.
//! 4.  Dispatching a name nobody listens to is a silent no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::envelope::{decode_envelope, Envelope};
use super::error::RealtimeError;
use super::lifecycle::{invoke_isolated, Channel, CloseEvent, ErrorEvent, OpenEvent, Subscription};
use super::lock;

/// A handler for named events. Registered handlers are identified by pointer,
/// so keep a clone of the `Arc` around to remove it later with `off`.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Where the transport manager delivers what its transports report.
pub trait FeedSink: Send + Sync {
    /// A transport reached the open state.
    fn opened(&self, event: &OpenEvent);
    /// The live transport closed.
    fn closed(&self, event: &CloseEvent);
    /// The live transport reported an error.
    fn errored(&self, event: &ErrorEvent);
    /// A raw message body arrived on the live transport.
    fn message(&self, raw: &str);
}

/// Named-event handler sets keyed by event name.
struct NamedHandlers {
    next_id: AtomicU64,
    by_event: Mutex<HashMap<String, Vec<(u64, EventHandler)>>>,
}

impl NamedHandlers {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_event: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a handler. Adding the same `Arc` twice keeps a single entry.
    fn insert(&self, event: &str, handler: EventHandler) -> u64 {
        let mut by_event = lock(&self.by_event);
        let entries = by_event.entry(event.to_string()).or_default();
        if let Some((id, _)) = entries.iter().find(|(_, known)| same_handler(known, &handler)) {
            return *id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push((id, handler));
        id
    }

    fn remove_where(&self, event: &str, mut matches: impl FnMut(u64, &EventHandler) -> bool) {
        let mut by_event = lock(&self.by_event);
        if let Some(entries) = by_event.get_mut(event) {
            entries.retain(|(id, handler)| !matches(*id, handler));
            if entries.is_empty() {
                by_event.remove(event);
            }
        }
    }

    fn snapshot(&self, event: &str) -> Vec<EventHandler> {
        lock(&self.by_event)
            .get(event)
            .map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default()
    }

    fn count(&self, event: &str) -> usize {
        lock(&self.by_event).get(event).map_or(0, Vec::len)
    }

    fn clear(&self) {
        lock(&self.by_event).clear();
    }
}

fn same_handler(a: &EventHandler, b: &EventHandler) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct RouterInner {
    named: Arc<NamedHandlers>,
    open: Arc<Channel<OpenEvent>>,
    close: Arc<Channel<CloseEvent>>,
    error: Arc<Channel<ErrorEvent>>,
    message: Arc<Channel<Envelope>>,
}

/// Decodes feed envelopes and fans them out to subscribers.
///
/// Cloning is cheap; clones share the same handler sets.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    /// Creates a router with no handlers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RouterInner {
                named: Arc::new(NamedHandlers::new()),
                open: Channel::new("open"),
                close: Channel::new("close"),
                error: Channel::new("error"),
                message: Channel::new("message"),
            }),
        }
    }

    /// Registers `handler` for `event` and returns the handle that removes it.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_handler(event, Arc::new(handler))
    }

    /// Registers a shared handler. Registering the same `Arc` twice for one
    /// event keeps a single registration.
    pub fn on_handler(&self, event: &str, handler: EventHandler) -> Subscription {
        let id = self.inner.named.insert(event, handler);
        let named = Arc::downgrade(&self.inner.named);
        let event = event.to_string();
        Subscription::new(move || {
            if let Some(named) = named.upgrade() {
                named.remove_where(&event, |known_id, _| known_id == id);
            }
        })
    }

    /// Registers a handler that receives the payload decoded as `T`.
    ///
    /// Payloads that do not decode are logged and skipped for this handler
    /// only; other handlers of the same event are unaffected.
    pub fn on_typed<T, F>(&self, event: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        self.on(event, move |payload: &Value| match T::deserialize(payload) {
            Ok(typed) => handler(typed),
            Err(e) => log::warn!("Skipping '{}' payload with unexpected shape: {}", name, e),
        })
    }

    /// Removes `handler` from `event`. Safe when it is not registered.
    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.inner
            .named
            .remove_where(event, |_, known| same_handler(known, handler));
    }

    /// Delivers `payload` to every handler registered for `event` and returns
    /// how many were called.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let handlers = self.inner.named.snapshot(event);
        if handlers.is_empty() {
            log::trace!("No handlers registered for '{}'", event);
            return 0;
        }
        for handler in &handlers {
            invoke_isolated(event, || handler(payload));
        }
        handlers.len()
    }

    /// Decodes one raw message body, notifies `on_message` handlers with the
    /// whole envelope and then dispatches the payload by name.
    pub fn handle_raw(&self, raw: &str) -> Result<usize, RealtimeError> {
        let envelope = decode_envelope(raw)?;
        self.inner.message.emit(&envelope);
        Ok(self.dispatch(&envelope.event, &envelope.payload))
    }

    /// Fires on every transport open.
    pub fn on_open<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&OpenEvent) + Send + Sync + 'static,
    {
        self.inner.open.subscribe(Arc::new(handler))
    }

    /// Fires on every transport close, manual ones included.
    pub fn on_close<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.inner.close.subscribe(Arc::new(handler))
    }

    /// Fires on every transport error.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.inner.error.subscribe(Arc::new(handler))
    }

    /// Fires once per decoded envelope, before named dispatch.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.message.subscribe(Arc::new(handler))
    }

    pub(crate) fn emit_open(&self, event: &OpenEvent) {
        self.inner.open.emit(event);
    }

    pub(crate) fn emit_close(&self, event: &CloseEvent) {
        self.inner.close.emit(event);
    }

    pub(crate) fn emit_error(&self, event: &ErrorEvent) {
        self.inner.error.emit(event);
    }

    /// Number of handlers currently registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.named.count(event)
    }

    /// Number of lifecycle handlers (open, close, error, message) registered.
    pub fn lifecycle_handler_count(&self) -> usize {
        self.inner.open.len() + self.inner.close.len() + self.inner.error.len() + self.inner.message.len()
    }

    /// Drops every registration, named and lifecycle.
    pub fn clear(&self) {
        self.inner.named.clear();
        self.inner.open.clear();
        self.inner.close.clear();
        self.inner.error.clear();
        self.inner.message.clear();
    }
}

impl FeedSink for EventRouter {
    fn opened(&self, event: &OpenEvent) {
        self.emit_open(event);
    }

    fn closed(&self, event: &CloseEvent) {
        self.emit_close(event);
    }

    fn errored(&self, event: &ErrorEvent) {
        self.emit_error(event);
    }

    fn message(&self, raw: &str) {
        if let Err(e) = self.handle_raw(raw) {
            log::warn!("Dropping malformed feed message ({} bytes): {}", raw.len(), e);
        }
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("lifecycle_handlers", &self.lifecycle_handler_count())
            .finish_non_exhaustive()
    }
}
