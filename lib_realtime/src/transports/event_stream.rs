//! # Server-Sent Events Transport
//!
//! Fallback feed transport. Only the default `message` channel is read.
//! Any failure (refused request, non-2xx status, broken or finished stream)
//! is reported as an error followed by an unclean close, the same shape a
//! dropped WebSocket produces.

use std::sync::atomic::{AtomicBool, Ordering};

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::error::RealtimeError;
use crate::core::transport::{Transport, TransportEvents, TransportKind, CLOSE_ABNORMAL};

/// Close reason reported for every SSE failure.
pub const SSE_ERROR_REASON: &str = "SSE connection error";

/// One SSE connection attempt.
#[derive(Debug)]
pub struct EventStreamTransport {
    client: reqwest::Client,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl EventStreamTransport {
    /// Creates an unopened transport issuing its request through `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

impl Transport for EventStreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::EventStream
    }

    fn open(&self, url: &Url, events: TransportEvents) -> Result<(), RealtimeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RealtimeError::Transport("SSE transport opened twice".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| RealtimeError::Transport(format!("no Tokio runtime for the SSE task: {e}")))?;
        runtime.spawn(run_stream(self.client.clone(), url.clone(), events, self.cancel.clone()));
        Ok(())
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventStreamTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn is_message_channel(name: &str) -> bool {
    name.is_empty() || name == "message"
}

fn fail(events: &TransportEvents, url: &Url, detail: String) {
    log::warn!("SSE stream {} failed: {}", url, detail);
    events.error(detail);
    events.closed(CLOSE_ABNORMAL, SSE_ERROR_REASON, false);
}

async fn run_stream(client: reqwest::Client, url: Url, events: TransportEvents, cancel: CancellationToken) {
    let request = client
        .get(url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send();

    let response = tokio::select! {
        _ = cancel.cancelled() => {
            log::debug!("SSE attempt to {} cancelled before the response arrived", url);
            return;
        }
        result = request => result.and_then(|response| response.error_for_status()),
    };
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            fail(&events, &url, e.to_string());
            return;
        }
    };

    log::info!("SSE stream open at {}", url);
    events.opened();
    let mut stream = response.bytes_stream().eventsource();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = stream.next() => {
                match next {
                    Some(Ok(event)) if is_message_channel(&event.event) => events.message(event.data),
                    Some(Ok(event)) => log::debug!("Ignoring SSE event '{}' from {}", event.event, url),
                    Some(Err(e)) => {
                        fail(&events, &url, e.to_string());
                        return;
                    }
                    None => {
                        fail(&events, &url, "stream ended by server".to_string());
                        return;
                    }
                }
            }
        }
    }
}
