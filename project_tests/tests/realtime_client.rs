//! # Realtime Client Scenarios
//!
//! End-to-end behaviour of `RealtimeClient` driven through a scripted
//! transport factory: reconnect timing, fallback selection, manual close,
//! and the test-injection surface. Time-dependent cases run on Tokio's
//! paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lib_realtime::{
    ConnectionState, EventOrigin, RealtimeClient, RealtimeError, RealtimeOptions, Transport, TransportEvents,
    TransportFactory, TransportKind, TransportMode,
};
use serde_json::{Value, json};
use url::Url;

const DELAY: Duration = Duration::from_millis(3000);

/// One scripted connection attempt.
struct ScriptedTransport {
    kind: TransportKind,
    url: Mutex<Option<Url>>,
    events: Mutex<Option<TransportEvents>>,
    closed: AtomicBool,
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn open(&self, url: &Url, events: TransportEvents) -> Result<(), RealtimeError> {
        *self.url.lock().unwrap() = Some(url.clone());
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedNetwork {
    attempts: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl TransportFactory for ScriptedNetwork {
    fn create(&self, kind: TransportKind) -> Arc<dyn Transport> {
        let attempt = Arc::new(ScriptedTransport {
            kind,
            url: Mutex::new(None),
            events: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.attempts.lock().unwrap().push(Arc::clone(&attempt));
        attempt
    }
}

impl ScriptedNetwork {
    fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn latest(&self) -> Arc<ScriptedTransport> {
        Arc::clone(self.attempts.lock().unwrap().last().expect("no attempt made"))
    }

    fn events(&self) -> TransportEvents {
        self.latest().events.lock().unwrap().clone().expect("attempt not opened")
    }

    fn url(&self) -> String {
        self.latest().url.lock().unwrap().clone().expect("attempt not opened").to_string()
    }
}

fn start() -> (RealtimeClient, Arc<ScriptedNetwork>) {
    let network = Arc::new(ScriptedNetwork::default());
    let options = RealtimeOptions {
        origin: "http://dashboard.local:8000".to_string(),
        reconnect_delay: DELAY,
        ..RealtimeOptions::default()
    };
    let client = RealtimeClient::start(&options, network.clone()).unwrap();
    (client, network)
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Sleeps just past one reconnect delay.
async fn one_delay() {
    tokio::time::sleep(DELAY + Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn start_targets_primary_endpoint() {
    let (client, network) = start();
    assert_eq!(network.attempts(), 1);
    assert_eq!(network.url(), "ws://dashboard.local:8000/api/ws");
    assert_eq!(client.snapshot().state, ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_misses_later_feed_messages() {
    let (client, network) = start();
    let hits = counter();
    let h = Arc::clone(&hits);
    let sub = client.on("device.update", move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    let feed = network.events();
    feed.opened();
    let body = r#"{"event":"device.update","payload":{"device_id":"d1","status":"online"},"created_at":"2024-05-01T10:00:00Z"}"#;
    feed.message(body);
    sub.unsubscribe();
    feed.message(body);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dispatch_without_handlers_is_a_no_op() {
    let (client, _network) = start();
    assert_eq!(client.dispatch("nobody.listens", &json!({"x": 1})), 0);
    assert_eq!(client.test_hooks().emit("nobody.listens", Value::Null), 0);
}

#[tokio::test(start_paused = true)]
async fn three_errors_and_a_close_arm_one_timer_then_use_fallback() {
    let (client, network) = start();
    let errors = counter();
    let e = Arc::clone(&errors);
    let _err = client.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });

    let feed = network.events();
    feed.error("refused");
    feed.error("refused");
    feed.error("refused");
    feed.closed(1006, "", false);
    // A second close from the same attempt must not arm another timer.
    feed.closed(1006, "", false);

    assert_eq!(errors.load(Ordering::SeqCst), 3);
    let snapshot = client.snapshot();
    assert!(snapshot.reconnect_armed);
    assert_eq!(snapshot.failures, 3);

    one_delay().await;
    assert_eq!(network.attempts(), 2);
    assert_eq!(network.latest().kind, TransportKind::EventStream);
    assert_eq!(network.url(), "http://dashboard.local:8000/api/events");

    one_delay().await;
    assert_eq!(network.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn fallback_survives_later_successes() {
    let (client, network) = start();
    for _ in 0..3 {
        network.events().error("refused");
    }
    network.events().closed(1006, "", false);
    one_delay().await;

    network.events().opened();
    assert_eq!(client.snapshot().failures, 0);
    network.events().closed(1006, "SSE connection error", false);
    one_delay().await;

    assert_eq!(network.attempts(), 3);
    assert_eq!(network.latest().kind, TransportKind::EventStream);
    assert_eq!(client.snapshot().mode, TransportMode::Fallback);
}

#[tokio::test(start_paused = true)]
async fn errors_spread_over_attempts_reach_the_threshold() {
    let (client, network) = start();
    for attempt in 1..=3 {
        network.events().error("handshake failed");
        network.events().closed(1006, "", false);
        one_delay().await;
        assert_eq!(network.attempts(), attempt + 1);
    }
    assert_eq!(network.latest().kind, TransportKind::EventStream);
    assert_eq!(client.snapshot().mode, TransportMode::Fallback);
}

#[tokio::test(start_paused = true)]
async fn close_twice_emits_exactly_one_close() {
    let (client, network) = start();
    network.events().opened();

    let closes = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&closes);
    let _close = client.on_close(move |event| c.lock().unwrap().push((event.code, event.was_clean)));
    let errors = counter();
    let e = Arc::clone(&errors);
    let _err = client.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });

    client.close();
    client.close();

    assert_eq!(*closes.lock().unwrap(), vec![(1000, true)]);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert!(network.latest().closed.load(Ordering::SeqCst));

    one_delay().await;
    assert_eq!(network.attempts(), 1);
    assert_eq!(client.snapshot().state, ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn explicit_reconnect_during_backoff_uses_fallback() {
    let (client, network) = start();
    let feed = network.events();
    for _ in 0..3 {
        feed.error("refused");
    }
    feed.closed(1006, "", false);
    assert!(client.snapshot().reconnect_armed);

    client.reconnect();
    assert_eq!(network.attempts(), 2);
    assert_eq!(network.latest().kind, TransportKind::EventStream);
    assert_eq!(network.url(), "http://dashboard.local:8000/api/events");

    // The cancelled timer must not open a third attempt.
    one_delay().await;
    assert_eq!(network.attempts(), 2);
    assert_eq!(client.snapshot().mode, TransportMode::Fallback);
}

#[tokio::test(start_paused = true)]
async fn close_before_open_is_reported_unclean() {
    let (client, network) = start();
    let closes = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&closes);
    let _close = client.on_close(move |event| {
        c.lock()
            .unwrap()
            .push((event.code, event.reason.clone(), event.was_clean))
    });

    client.close();

    assert_eq!(
        *closes.lock().unwrap(),
        vec![(1006, "client closed".to_string(), false)]
    );
    assert!(network.latest().closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn nothing_from_the_old_transport_after_close() {
    let (client, network) = start();
    let feed = network.events();
    feed.opened();
    client.close();

    let seen = counter();
    let s = Arc::clone(&seen);
    let _msg = client.on_message(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    let s = Arc::clone(&seen);
    let _close = client.on_close(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    feed.message(r#"{"event":"late","payload":{}}"#);
    feed.closed(1006, "late", false);
    one_delay().await;

    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(network.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_close_starts_on_primary_again() {
    let (client, network) = start();
    for _ in 0..3 {
        network.events().error("refused");
    }
    network.events().closed(1006, "", false);
    one_delay().await;
    assert_eq!(network.latest().kind, TransportKind::EventStream);

    client.close();
    client.reconnect();
    assert_eq!(network.attempts(), 3);
    assert_eq!(network.latest().kind, TransportKind::WebSocket);
    assert!(!client.snapshot().manual_close);
}

#[tokio::test(start_paused = true)]
async fn simulated_open_then_close_drive_a_connected_flag() {
    let (client, _network) = start();
    let connected = Arc::new(AtomicBool::new(false));
    let order = Arc::new(Mutex::new(Vec::new()));

    let (flag, log) = (Arc::clone(&connected), Arc::clone(&order));
    let _open = client.on_open(move |event| {
        assert_eq!(event.origin, EventOrigin::Simulated);
        flag.store(true, Ordering::SeqCst);
        log.lock().unwrap().push("open");
    });
    let (flag, log) = (Arc::clone(&connected), Arc::clone(&order));
    let _close = client.on_close(move |event| {
        assert_eq!((event.code, event.reason.as_str(), event.was_clean), (1000, "test", true));
        flag.store(false, Ordering::SeqCst);
        log.lock().unwrap().push("close");
    });

    let hooks = client.test_hooks();
    hooks.trigger_open();
    assert!(connected.load(Ordering::SeqCst));
    hooks.trigger_close();
    assert!(!connected.load(Ordering::SeqCst));
    assert_eq!(*order.lock().unwrap(), vec!["open", "close"]);

    // Hooks never reach the transport manager.
    assert!(!client.snapshot().reconnect_armed);
}

#[tokio::test(start_paused = true)]
async fn injected_device_update_reaches_only_device_subscribers() {
    let (client, _network) = start();
    let devices = Arc::new(Mutex::new(Vec::new()));
    let alarms = counter();

    let d = Arc::clone(&devices);
    let _dev = client.on("device.update", move |payload| d.lock().unwrap().push(payload.clone()));
    let a = Arc::clone(&alarms);
    let _alarm = client.on("alarm.raise", move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });

    client
        .test_hooks()
        .emit("device.update", json!({"device_id": "d1", "status": "offline"}));

    assert_eq!(*devices.lock().unwrap(), vec![json!({"device_id": "d1", "status": "offline"})]);
    assert_eq!(alarms.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_subscriber_does_not_starve_the_others() {
    let (client, network) = start();
    let hits = counter();
    let _boom = client.on("alarm.raise", |_| panic!("subscriber bug"));
    let h = Arc::clone(&hits);
    let _ok = client.on("alarm.raise", move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    network.events().opened();
    network
        .events()
        .message(r#"{"event":"alarm.raise","payload":{"code":"A1"},"created_at":"2024-05-01 10:00:00.5"}"#);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.snapshot().state, ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn typed_subscription_receives_decoded_payloads() {
    #[derive(serde::Deserialize)]
    struct Device {
        device_id: String,
        status: String,
    }

    let (client, network) = start();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let _typed = client.on_typed("device.update", move |device: Device| {
        s.lock().unwrap().push(format!("{}={}", device.device_id, device.status));
    });

    network.events().opened();
    network
        .events()
        .message(r#"{"event":"device.update","payload":{"device_id":"d7","status":"maintenance"}}"#);
    network.events().message(r#"{"event":"device.update","payload":{"status":"online"}}"#);

    assert_eq!(*seen.lock().unwrap(), vec!["d7=maintenance"]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_client_stops_reconnecting() {
    let (client, network) = start();
    network.events().closed(1006, "", false);
    assert!(client.snapshot().reconnect_armed);

    drop(client);
    one_delay().await;
    assert_eq!(network.attempts(), 1);
}
