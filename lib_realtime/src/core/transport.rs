//! # Transport Seam
//!
//! A transport is one connection attempt to the feed. The manager creates a
//! fresh transport object for every attempt through a `TransportFactory`, opens
//! it, and listens to it through the `TransportEvents` handle it passes in.
//!
//! Every variant maps its native behaviour onto the same four signals
//! (opened / message / error / closed), which keeps the manager's state machine
//! independent of what is actually on the wire.

use std::fmt;
use std::sync::{Arc, Weak};

use url::Url;

use super::error::RealtimeError;

/// Close code for a normal, clean shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code used when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code for a connection that went away without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Which kind of connection a transport object speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Persistent duplex WebSocket connection.
    WebSocket,
    /// Unidirectional Server-Sent Events stream.
    EventStream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::EventStream => write!(f, "event-stream"),
        }
    }
}

/// The manager's transport selection. Switches from `Primary` to `Fallback`
/// after repeated failures and only returns on an explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// WebSocket on the primary endpoint.
    Primary,
    /// SSE stream on the derived fallback endpoint.
    Fallback,
}

impl TransportMode {
    /// The transport kind used in this mode.
    pub fn kind(self) -> TransportKind {
        match self {
            TransportMode::Primary => TransportKind::WebSocket,
            TransportMode::Fallback => TransportKind::EventStream,
        }
    }
}

/// One connection attempt.
///
/// `open` must return promptly: negotiation happens in the background and its
/// outcome is reported through `events`. `close` must be idempotent and must
/// also stop an `open` that has not started yet.
pub trait Transport: Send + Sync {
    /// The kind of connection this object speaks.
    fn kind(&self) -> TransportKind;

    /// Starts connecting to `url`. Signals go to `events`.
    fn open(&self, url: &Url, events: TransportEvents) -> Result<(), RealtimeError>;

    /// Tears the connection down.
    fn close(&self);
}

/// Creates transport objects on demand, one per connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Returns a fresh, unopened transport of the requested kind.
    fn create(&self, kind: TransportKind) -> Arc<dyn Transport>;
}

/// Native signals a transport reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportSignal {
    Opened,
    Message(String),
    Error(String),
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
}

/// Receiver side of `TransportEvents`; implemented by the transport manager.
pub(crate) trait SignalTarget: Send + Sync {
    fn signal(self: Arc<Self>, generation: u64, signal: TransportSignal);
    fn is_current(&self, generation: u64) -> bool;
}

/// Handle a transport reports its lifecycle through.
///
/// Each handle is bound to one connection attempt. Once the manager detaches
/// that attempt (manual close, or replacement after a close) every further
/// signal sent through the handle is silently dropped.
#[derive(Clone)]
pub struct TransportEvents {
    target: Weak<dyn SignalTarget>,
    generation: u64,
    kind: TransportKind,
}

impl TransportEvents {
    pub(crate) fn new(target: Weak<dyn SignalTarget>, generation: u64, kind: TransportKind) -> Self {
        Self {
            target,
            generation,
            kind,
        }
    }

    /// The kind of transport this handle was issued to.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// False once the manager no longer listens to this attempt.
    pub fn is_attached(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.is_current(self.generation))
    }

    /// The connection is established.
    pub fn opened(&self) {
        self.send(TransportSignal::Opened);
    }

    /// A raw message body arrived.
    pub fn message(&self, raw: impl Into<String>) {
        self.send(TransportSignal::Message(raw.into()));
    }

    /// A transport-level error occurred. A close is expected to follow.
    pub fn error(&self, detail: impl Into<String>) {
        self.send(TransportSignal::Error(detail.into()));
    }

    /// The connection is gone.
    pub fn closed(&self, code: u16, reason: impl Into<String>, was_clean: bool) {
        self.send(TransportSignal::Closed {
            code,
            reason: reason.into(),
            was_clean,
        });
    }

    fn send(&self, signal: TransportSignal) {
        match self.target.upgrade() {
            Some(target) => target.signal(self.generation, signal),
            None => log::trace!("Dropping {} signal for a disposed client: {:?}", self.kind, signal),
        }
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .field("kind", &self.kind)
            .finish()
    }
}
