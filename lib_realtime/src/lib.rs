// Declare the modules to re-export
pub mod core; // Router, transport manager, endpoints and the client facade

#[cfg(feature = "transports")]
pub mod transports; // WebSocket and SSE implementations of core::Transport

#[cfg(feature = "retrieve")]
pub mod retrieve; // Retrying HTTP client for request/response endpoints

// Re-export everything callers normally touch
pub use crate::core::client::{RealtimeClient, RealtimeOptions};
pub use crate::core::envelope::Envelope;
pub use crate::core::error::RealtimeError;
pub use crate::core::lifecycle::{CloseEvent, ErrorEvent, EventOrigin, OpenEvent, Subscription};
pub use crate::core::manager::{ConnectionSnapshot, ConnectionState, ReconnectPolicy};
pub use crate::core::router::{EventHandler, EventRouter};
pub use crate::core::test_hooks::TestHooks;
pub use crate::core::transport::{Transport, TransportEvents, TransportFactory, TransportKind, TransportMode};

#[cfg(feature = "transports")]
pub use crate::transports::NetworkTransports;
