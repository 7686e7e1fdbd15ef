//! # Transport Manager
//!
//! Owns the single live connection to the feed and decides what happens when
//! it goes away.
//!
//! ```text
//! Idle --connect()--> Connecting
//! Connecting --opened--> Open              (failures -> 0, pending timer cancelled)
//! Connecting --error--> Connecting         (failures += 1)
//! Open --closed--> Closed --(not manual)--> reconnect timer --fires--> Connecting
//! any --close()--> Idle                    (manual: no reconnect)
//! ```
//!
//! When the reconnect timer fires with `failures >= fallback_threshold` the mode
//! switches from the WebSocket primary to the SSE fallback. The switch is
//! sticky until an explicit `close()`.
//!
//! Every connection attempt gets a new generation number. Signals from an
//! attempt that is no longer the live one are dropped, so a decommissioned
//! transport can never touch the state machine.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use super::endpoint::Endpoints;
use super::lifecycle::{CloseEvent, ErrorEvent, EventOrigin, OpenEvent};
use super::lock;
use super::router::FeedSink;
use super::transport::{
    SignalTarget, Transport, TransportEvents, TransportFactory, TransportKind, TransportMode, TransportSignal,
    CLOSE_ABNORMAL,
};

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
/// Consecutive failures after which the fallback transport takes over.
pub const DEFAULT_FALLBACK_THRESHOLD: u32 = 3;
/// Reason carried by the close event `close()` emits.
pub const CLIENT_CLOSE_REASON: &str = "client closed";

/// State of whichever transport is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing live, nothing scheduled by a close.
    Idle,
    /// A transport is negotiating.
    Connecting,
    /// A transport is open and delivering.
    Open,
    /// A manual close is tearing the transport down.
    Closing,
    /// The transport closed on its own; a reconnect is pending.
    Closed,
}

/// Reconnect and fallback tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before every reconnect attempt.
    pub delay: Duration,
    /// Failure count at which the next reconnect uses the fallback.
    pub fallback_threshold: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

/// Point-in-time view of the manager, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Primary or fallback.
    pub mode: TransportMode,
    /// Consecutive transport errors since the last open.
    pub failures: u32,
    /// Whether a reconnect timer is pending.
    pub reconnect_armed: bool,
    /// Whether an explicit close suppresses reconnection.
    pub manual_close: bool,
    /// URL of the live transport, if any.
    pub target: Option<Url>,
}

struct LiveTransport {
    generation: u64,
    kind: TransportKind,
    url: Url,
    transport: Arc<dyn Transport>,
}

struct ReconnectTimer {
    id: u64,
    task: JoinHandle<()>,
}

struct ManagerState {
    state: ConnectionState,
    mode: TransportMode,
    failures: u32,
    manual_close: bool,
    generation: u64,
    live: Option<LiveTransport>,
    reconnect_timer: Option<ReconnectTimer>,
    next_timer_id: u64,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            mode: TransportMode::Primary,
            failures: 0,
            manual_close: false,
            generation: 0,
            live: None,
            reconnect_timer: None,
            next_timer_id: 0,
        }
    }

    /// Kind of the live transport if `generation` is the live attempt.
    fn live_kind(&self, generation: u64) -> Option<TransportKind> {
        self.live
            .as_ref()
            .filter(|live| live.generation == generation)
            .map(|live| live.kind)
    }
}

struct Shared {
    endpoints: Endpoints,
    policy: ReconnectPolicy,
    factory: Arc<dyn TransportFactory>,
    sink: Arc<dyn FeedSink>,
    state: Mutex<ManagerState>,
}

/// Connection state machine with reconnect and fallback policy.
///
/// `connect`, `close` and `reconnect` return immediately; outcomes are
/// reported to the `FeedSink`. The sink is always called without internal
/// locks held, so it may call back into the manager.
///
/// Reconnect timers run on the Tokio runtime current at the time the close is
/// observed. Without a runtime no reconnect is scheduled.
pub struct TransportManager {
    shared: Arc<Shared>,
}

impl TransportManager {
    /// Creates an idle manager. Nothing is opened until `connect`.
    pub fn new(
        endpoints: Endpoints,
        policy: ReconnectPolicy,
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn FeedSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoints,
                policy,
                factory,
                sink,
                state: Mutex::new(ManagerState::new()),
            }),
        }
    }

    /// Opens a transport for the current mode unless one is already live.
    /// Clears the manual-close flag. A pending reconnect is taken over,
    /// including its switch to the fallback.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Detaches and tears down the live transport, cancels a pending
    /// reconnect, resets the failure count and returns to the primary mode.
    ///
    /// Emits one close if a transport was live: clean (1000) when it was open,
    /// unclean (1006) when it was still connecting. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Clears the manual-close flag and connects if nothing is live.
    pub fn reconnect(&self) {
        let live = {
            let mut state = lock(&self.shared.state);
            state.manual_close = false;
            state.live.is_some()
        };
        if !live {
            self.shared.connect();
        }
    }

    /// Current state, mode, failure count and target.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = lock(&self.shared.state);
        ConnectionSnapshot {
            state: state.state,
            mode: state.mode,
            failures: state.failures,
            reconnect_armed: state.reconnect_timer.is_some(),
            manual_close: state.manual_close,
            target: state.live.as_ref().map(|live| live.url.clone()),
        }
    }

    /// The resolved primary and fallback URLs.
    pub fn endpoints(&self) -> &Endpoints {
        &self.shared.endpoints
    }

    /// The reconnect policy in effect.
    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }
}

impl fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportManager")
            .field("endpoints", &self.shared.endpoints)
            .field("policy", &self.shared.policy)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Shared {
    fn connect(self: &Arc<Self>) {
        let (transport, url, events) = {
            let mut state = lock(&self.state);
            state.manual_close = false;

            if let Some(live) = &state.live {
                log::debug!("Connect ignored: {} transport already live ({:?})", live.kind, state.state);
                return;
            }
            // Connecting early must not skip the fallback decision the timer would have made.
            if let Some(timer) = state.reconnect_timer.take() {
                timer.task.abort();
                self.select_mode(&mut state);
            }

            state.generation += 1;
            let generation = state.generation;
            let kind = state.mode.kind();
            let url = self.endpoints.for_mode(state.mode).clone();
            let transport = self.factory.create(kind);

            let target: Weak<Shared> = Arc::downgrade(self);
            let target: Weak<dyn SignalTarget> = target;
            let events = TransportEvents::new(target, generation, kind);

            state.live = Some(LiveTransport {
                generation,
                kind,
                url: url.clone(),
                transport: Arc::clone(&transport),
            });
            state.state = ConnectionState::Connecting;
            (transport, url, events)
        };

        log::info!("Connecting {} transport to {}", transport.kind(), url);
        if let Err(e) = transport.open(&url, events.clone()) {
            log::error!("Failed to start {} transport: {}", transport.kind(), e);
            events.error(e.to_string());
            events.closed(CLOSE_ABNORMAL, e.to_string(), false);
        }
    }

    fn close(&self) {
        let (live, timer, was_open) = {
            let mut state = lock(&self.state);
            state.manual_close = true;
            state.failures = 0;
            state.mode = TransportMode::Primary;
            state.generation += 1;
            let timer = state.reconnect_timer.take();
            let live = state.live.take();
            let was_open = state.state == ConnectionState::Open;
            state.state = if live.is_some() {
                ConnectionState::Closing
            } else {
                ConnectionState::Idle
            };
            (live, timer, was_open)
        };

        if let Some(timer) = timer {
            timer.task.abort();
            log::debug!("Cancelled pending reconnect");
        }

        let Some(live) = live else {
            return;
        };
        live.transport.close();
        {
            let mut state = lock(&self.state);
            if state.live.is_none() && state.state == ConnectionState::Closing {
                state.state = ConnectionState::Idle;
            }
        }
        log::info!("Closed {} transport to {}", live.kind, live.url);
        let origin = EventOrigin::Transport(live.kind);
        // An attempt that never opened cannot have closed cleanly.
        let event = if was_open {
            CloseEvent::normal(origin, CLIENT_CLOSE_REASON)
        } else {
            CloseEvent::abnormal(origin, CLIENT_CLOSE_REASON)
        };
        self.sink.closed(&event);
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = lock(&self.state);
        if state.manual_close || state.live.is_some() {
            return;
        }
        if state.reconnect_timer.is_some() {
            log::debug!("Reconnect already scheduled");
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Cannot schedule reconnect without a Tokio runtime: {}", e);
                return;
            }
        };

        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let delay = self.policy.delay;
        let shared = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire_reconnect(id);
            }
        });
        state.reconnect_timer = Some(ReconnectTimer { id, task });
        log::info!("Reconnecting in {:?} (consecutive failures: {})", delay, state.failures);
    }

    fn fire_reconnect(self: &Arc<Self>, id: u64) {
        {
            let mut state = lock(&self.state);
            if !state.reconnect_timer.as_ref().is_some_and(|timer| timer.id == id) {
                return;
            }
            state.reconnect_timer = None;
            if state.manual_close || state.live.is_some() {
                return;
            }
            self.select_mode(&mut state);
        }
        self.connect();
    }

    /// Switches to the fallback once the failure count reaches the threshold.
    fn select_mode(&self, state: &mut ManagerState) {
        if state.mode == TransportMode::Primary && state.failures >= self.policy.fallback_threshold {
            state.mode = TransportMode::Fallback;
            log::warn!(
                "{} consecutive failures, switching to the {} fallback at {}",
                state.failures,
                TransportMode::Fallback.kind(),
                self.endpoints.fallback
            );
        }
    }
}

impl SignalTarget for Shared {
    fn signal(self: Arc<Self>, generation: u64, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => {
                let kind = {
                    let mut state = lock(&self.state);
                    let Some(kind) = state.live_kind(generation) else {
                        log::trace!("Dropping open from a detached transport");
                        return;
                    };
                    state.state = ConnectionState::Open;
                    state.failures = 0;
                    if let Some(timer) = state.reconnect_timer.take() {
                        timer.task.abort();
                    }
                    kind
                };
                log::info!("{} transport open", kind);
                self.sink.opened(&OpenEvent {
                    origin: EventOrigin::Transport(kind),
                });
            }
            TransportSignal::Message(raw) => {
                if !self.is_current(generation) {
                    log::trace!("Dropping message from a detached transport");
                    return;
                }
                self.sink.message(&raw);
            }
            TransportSignal::Error(message) => {
                let (kind, failures) = {
                    let mut state = lock(&self.state);
                    let Some(kind) = state.live_kind(generation) else {
                        return;
                    };
                    state.failures += 1;
                    (kind, state.failures)
                };
                log::warn!("{} transport error ({} consecutive): {}", kind, failures, message);
                self.sink.errored(&ErrorEvent {
                    origin: EventOrigin::Transport(kind),
                    message,
                });
            }
            TransportSignal::Closed {
                code,
                reason,
                was_clean,
            } => {
                let (live, manual) = {
                    let mut state = lock(&self.state);
                    if state.live_kind(generation).is_none() {
                        return;
                    }
                    let live = state.live.take();
                    state.state = if state.manual_close {
                        ConnectionState::Idle
                    } else {
                        ConnectionState::Closed
                    };
                    (live, state.manual_close)
                };
                let Some(live) = live else {
                    return;
                };
                live.transport.close();

                log::info!(
                    "{} transport closed (code {}, clean: {}): {}",
                    live.kind,
                    code,
                    was_clean,
                    if reason.is_empty() { "no reason" } else { reason.as_str() }
                );
                self.sink.closed(&CloseEvent {
                    origin: EventOrigin::Transport(live.kind),
                    code,
                    reason,
                    was_clean,
                });
                if !manual {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.state).live_kind(generation).is_some()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.reconnect_timer.take() {
            timer.task.abort();
        }
        if let Some(live) = state.live.take() {
            live.transport.close();
        }
    }
}
