//! # Realtime Client
//!
//! The facade the display layer owns. It is built explicitly, started
//! explicitly and disposed explicitly (or on drop); there is no global
//! instance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::endpoint::{Endpoints, DEFAULT_ENDPOINT};
use super::envelope::Envelope;
use super::error::RealtimeError;
use super::lifecycle::{CloseEvent, ErrorEvent, OpenEvent, Subscription};
use super::manager::{
    ConnectionSnapshot, ReconnectPolicy, TransportManager, DEFAULT_FALLBACK_THRESHOLD, DEFAULT_RECONNECT_DELAY,
};
use super::router::{EventHandler, EventRouter, FeedSink};
use super::test_hooks::TestHooks;
use super::transport::TransportFactory;

/// Dashboard origin used when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Client construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeOptions {
    /// Feed path, or an absolute `ws://` / `wss://` URL.
    pub endpoint: String,
    /// Base URL of the dashboard the feed path is resolved against.
    pub origin: String,
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Consecutive failures that switch the client to the SSE fallback.
    pub fallback_threshold: u32,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

impl RealtimeOptions {
    /// Resolves the primary and fallback URLs.
    pub fn endpoints(&self) -> Result<Endpoints, RealtimeError> {
        let origin = Url::parse(&self.origin).map_err(|source| RealtimeError::InvalidEndpoint {
            endpoint: self.origin.clone(),
            source,
        })?;
        Endpoints::resolve(&self.endpoint, &origin)
    }

    /// The reconnect policy these options describe.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: self.reconnect_delay,
            fallback_threshold: self.fallback_threshold,
        }
    }
}

/// Live feed client: a transport manager feeding an event router.
pub struct RealtimeClient {
    router: EventRouter,
    manager: TransportManager,
}

impl RealtimeClient {
    /// Builds an idle client. Call `connect` (or use `start`) to go live.
    pub fn new(options: &RealtimeOptions, factory: Arc<dyn TransportFactory>) -> Result<Self, RealtimeError> {
        let endpoints = options.endpoints()?;
        let router = EventRouter::new();
        let sink: Arc<dyn FeedSink> = Arc::new(router.clone());
        let manager = TransportManager::new(endpoints, options.policy(), factory, sink);
        Ok(Self { router, manager })
    }

    /// Builds a client and immediately attempts the primary connection.
    pub fn start(options: &RealtimeOptions, factory: Arc<dyn TransportFactory>) -> Result<Self, RealtimeError> {
        let client = Self::new(options, factory)?;
        client.connect();
        Ok(client)
    }

    /// `start` with the WebSocket and SSE network transports.
    #[cfg(feature = "transports")]
    pub fn start_with_network(options: &RealtimeOptions) -> Result<Self, RealtimeError> {
        Self::start(options, Arc::new(crate::transports::NetworkTransports::new()))
    }

    /// See `TransportManager::connect`.
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// See `TransportManager::close`.
    pub fn close(&self) {
        self.manager.close();
    }

    /// See `TransportManager::reconnect`.
    pub fn reconnect(&self) {
        self.manager.reconnect();
    }

    /// Drops every subscription, then closes. No handler is called once this
    /// starts. Safe to call repeatedly; also runs on drop.
    pub fn dispose(&self) {
        self.router.clear();
        self.manager.close();
    }

    /// See `EventRouter::on`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.router.on(event, handler)
    }

    /// See `EventRouter::on_handler`.
    pub fn on_handler(&self, event: &str, handler: EventHandler) -> Subscription {
        self.router.on_handler(event, handler)
    }

    /// See `EventRouter::on_typed`.
    pub fn on_typed<T, F>(&self, event: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.router.on_typed(event, handler)
    }

    /// See `EventRouter::off`.
    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.router.off(event, handler);
    }

    /// See `EventRouter::dispatch`.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        self.router.dispatch(event, payload)
    }

    /// See `EventRouter::on_open`.
    pub fn on_open<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&OpenEvent) + Send + Sync + 'static,
    {
        self.router.on_open(handler)
    }

    /// See `EventRouter::on_close`.
    pub fn on_close<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.router.on_close(handler)
    }

    /// See `EventRouter::on_error`.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.router.on_error(handler)
    }

    /// See `EventRouter::on_message`.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.router.on_message(handler)
    }

    /// The router, for components that only subscribe.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Connection state, mode, failure count and target.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.manager.snapshot()
    }

    /// The resolved primary and fallback URLs.
    pub fn endpoints(&self) -> &Endpoints {
        self.manager.endpoints()
    }

    /// Test-injection surface bound to this client's router.
    pub fn test_hooks(&self) -> TestHooks {
        TestHooks::new(&self.router)
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("router", &self.router)
            .field("manager", &self.manager)
            .finish()
    }
}
