//! # Core Realtime Module
//!
//! This module forms the heart of the dashboard feed client. It holds everything
//! needed to keep a live view current from a server-pushed event feed, with no
//! dependency on a particular network stack.
//!
//! ## Core Components:
//!
//! - **`router`**: The `EventRouter`. Decodes envelopes and fans them out to the
//!   handlers registered for each event name, plus the open/close/error/message
//!   lifecycle channels.
//!
//! - **`manager`**: The `TransportManager` state machine. Owns at most one live
//!   transport, counts consecutive failures, arms a single reconnect timer and
//!   switches from the primary transport to the fallback after repeated failures.
//!
//! - **`transport`**: The `Transport` / `TransportFactory` seam and the
//!   `TransportEvents` handle a transport reports its signals through.
//!
//! - **`client`**: The `RealtimeClient` facade tying router and manager together
//!   with an explicit start/dispose lifecycle.
//!
//! Network implementations of `Transport` live in the `transports` module
//! (feature `transports`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Public client facade with start/dispose lifecycle.
pub mod client;
/// Resolution of the primary and fallback feed URLs.
pub mod endpoint;
/// The `{event, payload, created_at}` wire unit.
pub mod envelope;
/// Error types for the realtime client.
pub mod error;
/// Lifecycle events, handler channels and subscription handles.
pub mod lifecycle;
/// Connection state machine with reconnect and fallback policy.
pub mod manager;
/// Named-event dispatch and lifecycle fan-out.
pub mod router;
/// Test-injection surface routed through the production dispatch paths.
pub mod test_hooks;
/// The transport seam implemented by the WebSocket and SSE transports.
pub mod transport;

// --- Public API Re-exports ---
pub use client::{RealtimeClient, RealtimeOptions};
pub use endpoint::Endpoints;
pub use envelope::Envelope;
pub use error::RealtimeError;
pub use manager::{ConnectionSnapshot, ConnectionState, ReconnectPolicy, TransportManager};
pub use router::{EventRouter, FeedSink};
pub use transport::{Transport, TransportEvents, TransportFactory, TransportKind, TransportMode};

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Handlers never run while one of these locks is held, so a poisoned lock only
/// means a bookkeeping update was interrupted; the data is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
