//! # Network Transports
//!
//! Implementations of `core::Transport` that actually reach the feed server.
//! Each transport object drives one connection attempt on a Tokio task and
//! reports its lifecycle through the `TransportEvents` handle it was opened
//! with; a `CancellationToken` stops that task on `close`.
//!
//! ## Contained Modules:
//! - **`websocket`**: The primary transport, a duplex WebSocket connection
//!   built on `tokio-tungstenite`.
//! - **`event_stream`**: The fallback transport, a Server-Sent Events stream
//!   read with `reqwest` and decoded by `eventsource-stream`.
//!
//! `NetworkTransports` is the `TransportFactory` that hands these out.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;

use crate::core::transport::{Transport, TransportFactory, TransportKind};

/// SSE fallback transport.
pub mod event_stream;
/// WebSocket primary transport.
pub mod websocket;

// --- Public API Re-exports ---
pub use event_stream::EventStreamTransport;
pub use websocket::WebSocketTransport;

/// Factory producing a fresh network transport per connection attempt.
///
/// SSE attempts share one `reqwest::Client` (and so its connection pool).
#[derive(Debug, Clone, Default)]
pub struct NetworkTransports {
    http: reqwest::Client,
}

impl NetworkTransports {
    /// Factory with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportFactory for NetworkTransports {
    fn create(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::WebSocket => Arc::new(WebSocketTransport::new()),
            TransportKind::EventStream => Arc::new(EventStreamTransport::new(self.http.clone())),
        }
    }
}
