#![allow(dead_code)]

use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use utms_relay::telemetry::TelemetryRelay;
use utms_relay::{Relay, RelayConfig};

pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn dead_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config_for(upstream: SocketAddr) -> RelayConfig {
    let mut cfg = RelayConfig::default();
    cfg.server.bind = "127.0.0.1:0".into();
    cfg.upstream.base_url = format!("http://{}", upstream);
    cfg.upstream.timeout_ms = 2_000;
    cfg
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    pub telemetry: TelemetryRelay,
    stop: Option<oneshot::Sender<()>>,
}

impl RunningRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Wait for every per-connection poller to be released.
    pub async fn wait_idle(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.telemetry.active_pollers() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.telemetry.active_pollers() == 0
    }
}

pub async fn spawn_relay(cfg: RelayConfig) -> RunningRelay {
    let relay = Relay::new(&cfg).unwrap();
    let telemetry = relay.telemetry().clone();
    let listener = TcpListener::bind(&cfg.server.bind).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        relay
            .serve(listener, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    RunningRelay { addr, telemetry, stop: Some(stop) }
}
