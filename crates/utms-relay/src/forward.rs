use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use utms_proto::command::{Method, Operation};
use utms_proto::telemetry::TelemetrySnapshot;

use crate::error::ForwardError;
use crate::UpstreamConfig;

/// Proxies relay operations to the drone control service.
///
/// Successful responses come back as the control service's JSON, untouched.
/// Every failure is logged here once, then handed to the caller.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    base_url: String,
    retry_on_transport_error: bool,
}

impl Forwarder {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, ForwardError> {
        let client = Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            retry_on_transport_error: cfg.retry_on_transport_error,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bodiless call.
    pub async fn call(&self, op: Operation) -> Result<Value, ForwardError> {
        self.dispatch(op, None::<&()>).await
    }

    /// Call with a JSON body.
    pub async fn send<B: Serialize>(&self, op: Operation, body: &B) -> Result<Value, ForwardError> {
        self.dispatch(op, Some(body)).await
    }

    /// Telemetry as the control service sent it. The body must read as a
    /// snapshot, but nulls and number formats are left alone.
    pub async fn telemetry(&self) -> Result<Value, ForwardError> {
        let v = self.call(Operation::Telemetry).await?;
        if let Err(e) = TelemetrySnapshot::deserialize(&v) {
            warn!("forward {}: malformed snapshot: {}", Operation::Telemetry, e);
            return Err(ForwardError::Snapshot(e));
        }
        Ok(v)
    }

    async fn dispatch<B: Serialize + ?Sized>(&self, op: Operation, body: Option<&B>) -> Result<Value, ForwardError> {
        let res = match self.attempt(op, body).await {
            Err(ForwardError::Transport(e)) if self.retry_on_transport_error && is_unreachable(&e) => {
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(50..=250));
                debug!("forward {}: {} (retrying in {:?})", op, e, jitter);
                tokio::time::sleep(jitter).await;
                self.attempt(op, body).await
            }
            other => other,
        };
        if let Err(e) = &res {
            warn!("forward {}: {}", op, e);
        }
        res
    }

    async fn attempt<B: Serialize + ?Sized>(&self, op: Operation, body: Option<&B>) -> Result<Value, ForwardError> {
        let url = format!("{}{}", self.base_url, op.path());
        let mut req = match op.method() {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ForwardError::Status {
                status: status.as_u16(),
                message: upstream_message(status.as_u16(), &text),
            });
        }
        resp.json::<Value>().await.map_err(ForwardError::Decode)
    }
}

fn is_unreachable(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Pull a human readable reason out of an error response body.
fn upstream_message(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    });
    match from_json {
        Some(m) if !m.is_empty() => m,
        _ => format!("control service returned HTTP {}", status),
    }
}
