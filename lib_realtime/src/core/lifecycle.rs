//! # Lifecycle Events and Handler Channels
//!
//! Lifecycle channels (open / close / error / message) are independent of
//! named-event dispatch. Each `Channel` keeps its handlers in a list keyed by a
//! registration id; registering returns a `Subscription` that removes exactly
//! that entry.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::lock;
use super::transport::{TransportKind, CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Where a lifecycle event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Reported by a live transport of this kind.
    Transport(TransportKind),
    /// Injected through `TestHooks`.
    Simulated,
}

/// The feed connection is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    /// Source of the event.
    pub origin: EventOrigin,
}

/// The feed connection is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Source of the event.
    pub origin: EventOrigin,
    /// WebSocket-style close code (1000 normal, 1006 abnormal).
    pub code: u16,
    /// Human readable close reason, possibly empty.
    pub reason: String,
    /// Whether the connection went through an orderly shutdown.
    pub was_clean: bool,
}

impl CloseEvent {
    /// A clean close with code 1000.
    pub fn normal(origin: EventOrigin, reason: impl Into<String>) -> Self {
        Self {
            origin,
            code: CLOSE_NORMAL,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// An unclean close with code 1006.
    pub fn abnormal(origin: EventOrigin, reason: impl Into<String>) -> Self {
        Self {
            origin,
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// A transport-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Source of the event.
    pub origin: EventOrigin,
    /// Description of the failure, as reported by the transport.
    pub message: String,
}

/// Shared callback type for every channel.
pub(crate) type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by every registration.
///
/// Calling `unsubscribe` removes exactly the handler it was issued for. It is
/// safe to call more than once, and safe after the owning client has been
/// disposed. Dropping the handle leaves the handler registered.
pub struct Subscription {
    remover: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(remover: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remover: Mutex::new(Some(Box::new(remover))),
        }
    }

    /// Removes the handler. No-op if it is already gone.
    pub fn unsubscribe(&self) {
        let remover = lock(&self.remover).take();
        if let Some(remove) = remover {
            remove();
        }
    }

    /// True until `unsubscribe` has been called on this handle.
    pub fn is_active(&self) -> bool {
        lock(&self.remover).is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// An ordered list of handlers for one lifecycle channel.
pub(crate) struct Channel<E: 'static> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Callback<E>)>>,
}

impl<E: 'static> Channel<E> {
    pub(crate) fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn subscribe(self: &Arc<Self>, handler: Callback<E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));

        let channel = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(channel) = channel.upgrade() {
                channel.remove(id);
            }
        })
    }

    fn remove(&self, id: u64) {
        lock(&self.handlers).retain(|(handler_id, _)| *handler_id != id);
    }

    /// Invokes every handler registered at the time of the call.
    pub(crate) fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Callback<E>> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &snapshot {
            invoke_isolated(self.name, || handler(event));
        }
        snapshot.len()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub(crate) fn clear(&self) {
        lock(&self.handlers).clear();
    }
}

/// Runs one handler, containing a panic so the remaining handlers still run.
pub(crate) fn invoke_isolated(channel: &str, call: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::error!("Handler for '{}' panicked: {}. Continuing with remaining handlers.", channel, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unsubscribe_removes_only_its_handler() {
        let channel: Arc<Channel<u32>> = Channel::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        let sub_first = channel.subscribe(Arc::new(move |_: &u32| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = Arc::clone(&second);
        let _sub_second = channel.subscribe(Arc::new(move |_: &u32| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(channel.emit(&1), 2);
        sub_first.unsubscribe();
        sub_first.unsubscribe();
        assert!(!sub_first.is_active());
        assert_eq!(channel.emit(&2), 1);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let channel: Arc<Channel<u32>> = Channel::new("test");
        let delivered = Arc::new(AtomicUsize::new(0));

        let _boom = channel.subscribe(Arc::new(|_: &u32| panic!("handler failure")));
        let d = Arc::clone(&delivered);
        let _ok = channel.subscribe(Arc::new(move |_: &u32| {
            d.fetch_add(1, Ordering::SeqCst);
        }));

        channel.emit(&7);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_after_channel_is_gone_is_noop() {
        let channel: Arc<Channel<u32>> = Channel::new("test");
        let sub = channel.subscribe(Arc::new(|_: &u32| {}));
        drop(channel);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn close_event_constructors() {
        let clean = CloseEvent::normal(EventOrigin::Simulated, "bye");
        assert_eq!((clean.code, clean.was_clean), (1000, true));
        let dirty = CloseEvent::abnormal(EventOrigin::Transport(TransportKind::EventStream), "lost");
        assert_eq!((dirty.code, dirty.was_clean), (1006, false));
    }
}
