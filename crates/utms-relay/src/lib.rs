pub mod doctor;
pub mod error;
pub mod forward;
pub mod invoke;
pub mod server;
pub mod telemetry;

use serde::Deserialize;
use std::time::Duration;

pub use server::Relay;

/// Top-level relay configuration. Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub telemetry: TelemetryConfig,
    pub invoker: InvokerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for both REST and WebSocket traffic.
    pub bind: String,

    /// Mount point of the REST endpoints. "" or "/" serves them at the root.
    /// WebSocket upgrades are always accepted at `/` and `/ws`.
    pub api_prefix: String,

    /// Browser origins allowed to call the REST endpoints, e.g.
    /// "http://localhost:3000". Empty allows any origin.
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".into(), api_prefix: "/api".into(), cors_allow_origins: Vec::new() }
    }
}

impl ServerConfig {
    /// Normalized prefix, `None` when endpoints live at the root.
    pub fn prefix(&self) -> Option<&str> {
        let p = self.api_prefix.trim_end_matches('/');
        if p.is_empty() { None } else { Some(p) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base address of the drone control service.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout_ms: u64,

    /// Retry once (after 50..250 ms of jitter) when the control service
    /// cannot be reached. HTTP error statuses are never retried.
    pub retry_on_transport_error: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5555".into(),
            timeout_ms: 10_000,
            retry_on_transport_error: false,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Push period for every WebSocket client.
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 500 }
    }
}

impl TelemetryConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Executable that implements `scan_ports` / `auto_connect`.
    pub program: String,

    /// Leading arguments; the sub-command name is appended after them.
    pub args: Vec<String>,

    /// Hard limit on one invocation. The child is killed when it expires.
    pub timeout_ms: u64,

    /// When non-empty, the result is the last stdout line starting with this
    /// marker. Otherwise it is the last non-empty stdout line.
    pub result_sentinel: Option<String>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["python-core/drone_controller.py".into()],
            timeout_ms: 120_000,
            result_sentinel: None,
        }
    }
}

impl InvokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.result_sentinel.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert_eq!(cfg.server.prefix(), Some("/api"));
        assert_eq!(cfg.telemetry.period(), Duration::from_millis(500));
        assert_eq!(cfg.upstream.base_url, "http://localhost:5555");
        assert!(!cfg.upstream.retry_on_transport_error);
        assert_eq!(cfg.invoker.sentinel(), None);
        assert!(cfg.server.cors_allow_origins.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [server]
            api_prefix = "/"
            cors_allow_origins = ["http://localhost:3000"]

            [invoker]
            program = "/opt/utms/bin/controller"
            result_sentinel = ""
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert_eq!(cfg.server.prefix(), None);
        assert_eq!(cfg.server.cors_allow_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(cfg.invoker.program, "/opt/utms/bin/controller");
        assert_eq!(cfg.invoker.args, vec!["python-core/drone_controller.py".to_string()]);
        assert_eq!(cfg.invoker.sentinel(), None);
        assert_eq!(cfg.invoker.timeout_ms, 120_000);
    }

    #[test]
    fn prefix_trailing_slash_is_dropped() {
        let s = ServerConfig { api_prefix: "/api/".into(), ..Default::default() };
        assert_eq!(s.prefix(), Some("/api"));
    }
}
