//! Test-injection surface.
//!
//! Everything here goes through the same router entry points live traffic
//! uses: `emit` is `EventRouter::dispatch`, and the `trigger_*` calls emit on
//! the lifecycle channels. Hooks never touch the transport manager, so a
//! simulated close does not schedule a reconnect.

use serde_json::Value;

use super::error::RealtimeError;
use super::lifecycle::{CloseEvent, ErrorEvent, EventOrigin, OpenEvent};
use super::router::EventRouter;

/// Reason carried by `trigger_close`.
pub const SIMULATED_CLOSE_REASON: &str = "test";
/// Message carried by `trigger_error`.
pub const SIMULATED_ERROR_MESSAGE: &str = "simulated transport error";

/// Injects events into a router as if they came off the feed.
#[derive(Debug, Clone)]
pub struct TestHooks {
    router: EventRouter,
}

impl TestHooks {
    /// Hooks bound to `router`.
    pub fn new(router: &EventRouter) -> Self {
        Self { router: router.clone() }
    }

    /// Dispatches `payload` under `event`. Returns the number of handlers
    /// called.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.router.dispatch(event, &payload)
    }

    /// Feeds one raw message body through decoding and dispatch.
    pub fn emit_raw(&self, raw: &str) -> Result<usize, RealtimeError> {
        self.router.handle_raw(raw)
    }

    /// Emits an open on the lifecycle channel.
    pub fn trigger_open(&self) {
        self.router.emit_open(&OpenEvent {
            origin: EventOrigin::Simulated,
        });
    }

    /// Emits a clean close (code 1000, reason `"test"`).
    pub fn trigger_close(&self) {
        self.router
            .emit_close(&CloseEvent::normal(EventOrigin::Simulated, SIMULATED_CLOSE_REASON));
    }

    /// Emits a transport error.
    pub fn trigger_error(&self) {
        self.router.emit_error(&ErrorEvent {
            origin: EventOrigin::Simulated,
            message: SIMULATED_ERROR_MESSAGE.to_string(),
        });
    }
}
