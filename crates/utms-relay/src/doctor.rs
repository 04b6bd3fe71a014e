use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use tracing::warn;
use utms_proto::command::Operation;
use utms_proto::envelope::HealthStatus;

use crate::forward::Forwarder;
use crate::{InvokerConfig, RelayConfig, ServerConfig, TelemetryConfig, UpstreamConfig};

pub fn check_config(cfg: &RelayConfig) -> Result<()> {
    check_server(&cfg.server)?;
    check_upstream(&cfg.upstream)?;
    check_telemetry(&cfg.telemetry)?;
    check_invoker(&cfg.invoker)?;
    Ok(())
}

pub fn check_server(s: &ServerConfig) -> Result<()> {
    s.bind.parse::<SocketAddr>().with_context(|| format!("server.bind invalid: {}", s.bind))?;
    if let Some(p) = s.prefix() {
        anyhow::ensure!(p.starts_with('/'), "server.api_prefix must start with '/': {}", p);
        anyhow::ensure!(p != "/ws", "server.api_prefix collides with the WebSocket route");
    }
    for o in &s.cors_allow_origins {
        let url = reqwest::Url::parse(o).with_context(|| format!("server.cors_allow_origins invalid: {}", o))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https") && url.path() == "/" && !o.ends_with('/'),
            "server.cors_allow_origins entries look like http://host:port, got {}",
            o
        );
    }
    Ok(())
}

pub fn check_upstream(u: &UpstreamConfig) -> Result<()> {
    let url = reqwest::Url::parse(&u.base_url).with_context(|| format!("upstream.base_url invalid: {}", u.base_url))?;
    anyhow::ensure!(matches!(url.scheme(), "http" | "https"), "upstream.base_url must be http(s)");
    anyhow::ensure!(u.timeout_ms >= 100 && u.timeout_ms <= 120_000, "upstream.timeout_ms should be 100..120000");
    Ok(())
}

pub fn check_telemetry(t: &TelemetryConfig) -> Result<()> {
    anyhow::ensure!(
        t.poll_interval_ms >= 50 && t.poll_interval_ms <= 10_000,
        "telemetry.poll_interval_ms should be 50..10000"
    );
    Ok(())
}

pub fn check_invoker(i: &InvokerConfig) -> Result<()> {
    anyhow::ensure!(!i.program.trim().is_empty(), "invoker.program missing");
    anyhow::ensure!(i.timeout_ms >= 1_000, "invoker.timeout_ms too small; auto-connect probes take seconds");
    // Relative script paths resolve against the working directory of `serve`.
    for arg in i.args.iter().filter(|a| a.ends_with(".py")) {
        if !Path::new(arg).exists() {
            warn!("invoker script not found from here: {}", arg);
        }
    }
    Ok(())
}

/// Ask the control service whether it is up.
pub async fn probe_upstream(fwd: &Forwarder) -> Result<HealthStatus> {
    let v = fwd
        .call(Operation::Health)
        .await
        .with_context(|| format!("control service at {} not reachable", fwd.base_url()))?;
    serde_json::from_value(v).context("unexpected /health response")
}
