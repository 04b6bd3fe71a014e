use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use utms_proto::telemetry::PollFailure;

use crate::forward::Forwarder;

/// Pushes telemetry to WebSocket clients, one independent poll loop per
/// connection.
#[derive(Clone)]
pub struct TelemetryRelay {
    forwarder: Forwarder,
    period: Duration,
    active: Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
}

impl TelemetryRelay {
    pub fn new(forwarder: Forwarder, period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { forwarder, period, active: Arc::new(AtomicUsize::new(0)), shutdown }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Connections currently holding a poll timer.
    pub fn active_pollers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// One poll: a snapshot, or a failure frame. Never a cached value.
    pub async fn next_frame(&self) -> String {
        match self.forwarder.telemetry().await {
            Ok(body) => body.to_string(),
            Err(e) => failure_frame(&e.to_string()),
        }
    }

    /// Drive one client until it goes away or the server shuts down.
    pub async fn serve(self, socket: WebSocket, peer: SocketAddr) {
        let mut poller = PollerGuard::acquire(self.active.clone());
        info!("ws: client connected {}", peer);

        let (mut tx, mut rx) = socket.split();
        let mut shutdown = self.shutdown.clone();
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = if *shutdown.borrow() {
            "server shutting down".to_string()
        } else {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A slow poll must not hold up shutdown or close detection.
                        let frame = tokio::select! {
                            frame = self.next_frame() => frame,
                            incoming = rx.next() => match stream_end(incoming, peer) {
                                Some(reason) => break reason,
                                None => continue,
                            },
                            _ = shutdown.changed() => {
                                let _ = tx.send(Message::Close(None)).await;
                                break "server shutting down".to_string();
                            }
                        };
                        if let Err(e) = tx.send(Message::Text(frame)).await {
                            break format!("send failed: {}", e);
                        }
                    }
                    incoming = rx.next() => if let Some(reason) = stream_end(incoming, peer) {
                        break reason;
                    },
                    _ = shutdown.changed() => {
                        let _ = tx.send(Message::Close(None)).await;
                        break "server shutting down".to_string();
                    }
                }
            }
        };

        poller.release();
        info!("ws: client disconnected {} ({})", peer, reason);
    }
}

/// Why the client stream ended, or `None` if the frame is just chatter.
fn stream_end(incoming: Option<Result<Message, axum::Error>>, peer: SocketAddr) -> Option<String> {
    match incoming {
        None | Some(Ok(Message::Close(_))) => Some("closed by client".to_string()),
        Some(Err(e)) => Some(format!("transport error: {}", e)),
        Some(Ok(_)) => {
            debug!("ws: ignoring client frame from {}", peer);
            None
        }
    }
}

fn failure_frame(error: &str) -> String {
    let failure = PollFailure {
        error: error.to_string(),
        ts_unix_ms: (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
    };
    serde_json::to_string(&failure).unwrap_or_else(|_| r#"{"error":"telemetry error"}"#.to_string())
}

/// Counts a connection's poll timer as live until released or dropped.
/// Releasing twice is a no-op.
struct PollerGuard {
    active: Arc<AtomicUsize>,
    released: bool,
}

impl PollerGuard {
    fn acquire(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active, released: false }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        self.release();
    }
}
