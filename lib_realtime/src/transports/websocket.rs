//! # WebSocket Transport
//!
//! Primary feed transport. Text frames are handed over as message bodies;
//! binary frames are accepted when they hold UTF-8 text.
//! Location: lib_realtime/src/transports/websocket.rs

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::error::RealtimeError;
use crate::core::transport::{Transport, TransportEvents, TransportKind, CLOSE_ABNORMAL, CLOSE_NO_STATUS};

/// One WebSocket connection attempt.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    cancel: CancellationToken,
    started: AtomicBool,
}

impl WebSocketTransport {
    /// Creates an unopened transport.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn open(&self, url: &Url, events: TransportEvents) -> Result<(), RealtimeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RealtimeError::Transport("WebSocket transport opened twice".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| RealtimeError::Transport(format!("no Tokio runtime for the WebSocket task: {e}")))?;
        runtime.spawn(run_socket(url.clone(), events, self.cancel.clone()));
        Ok(())
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(url: Url, events: TransportEvents, cancel: CancellationToken) {
    let handshake = tokio::select! {
        _ = cancel.cancelled() => {
            log::debug!("WebSocket attempt to {} cancelled before the handshake finished", url);
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match handshake {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            log::error!("WebSocket handshake with {} failed: {}", url, e);
            events.error(e.to_string());
            events.closed(CLOSE_ABNORMAL, e.to_string(), false);
            return;
        }
    };

    log::info!("WebSocket connected to {}", url);
    events.opened();
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    log::debug!("Close frame to {} not delivered: {}", url, e);
                }
                return;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => events.message(text),
                        Err(_) => log::warn!("Dropping non UTF-8 binary frame ({} bytes)", bytes.len()),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|frame| (u16::from(frame.code), frame.reason.as_str().to_string()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        log::info!("WebSocket closed by {} (code {})", url, code);
                        events.closed(code, reason, true);
                        return;
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("WebSocket read error from {}: {}", url, e);
                        events.error(e.to_string());
                        events.closed(CLOSE_ABNORMAL, e.to_string(), false);
                        return;
                    }
                    None => {
                        log::warn!("WebSocket stream from {} ended without a close frame", url);
                        events.closed(CLOSE_ABNORMAL, "connection dropped", false);
                        return;
                    }
                }
            }
        }
    }
}
