use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use utms_proto::command::Operation;
use utms_proto::envelope::HealthStatus;

use crate::error::{ApiError, ForwardError};
use crate::forward::Forwarder;
use crate::invoke::{ProcessInvoker, SubCommand};
use crate::telemetry::TelemetryRelay;
use crate::{RelayConfig, ServerConfig};

#[derive(Clone)]
struct AppState {
    forwarder: Forwarder,
    invoker: Arc<ProcessInvoker>,
    relay: TelemetryRelay,
}

/// REST + WebSocket front door on a single listener.
pub struct Relay {
    state: AppState,
    server: ServerConfig,
    shutdown: watch::Sender<bool>,
}

impl Relay {
    pub fn new(cfg: &RelayConfig) -> Result<Self, ForwardError> {
        let forwarder = Forwarder::new(&cfg.upstream)?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let relay = TelemetryRelay::new(forwarder.clone(), cfg.telemetry.period(), shutdown_rx);
        Ok(Self {
            state: AppState { forwarder, invoker: Arc::new(ProcessInvoker::new(&cfg.invoker)), relay },
            server: cfg.server.clone(),
            shutdown,
        })
    }

    pub fn telemetry(&self) -> &TelemetryRelay {
        &self.state.relay
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/health", get(health))
            .route("/ports/scan", get(scan_ports))
            .route("/auto-connect", post(auto_connect))
            .route("/connect", post(connect))
            .route("/disconnect", post(disconnect))
            .route("/telemetry", get(telemetry))
            .route("/arm", post(arm))
            .route("/disarm", post(disarm))
            .route("/takeoff", post(takeoff))
            .route("/land", post(land))
            .route("/mode", post(mode))
            .route("/goto", post(goto));

        let ws = Router::new().route("/", get(ws_upgrade)).route("/ws", get(ws_upgrade));
        let app = match self.server.prefix() {
            Some(prefix) => ws.nest(prefix, api),
            None => ws.merge(api),
        };
        app.with_state(self.state.clone()).layer(cors_layer(&self.server.cors_allow_origins))
    }

    /// Serve until `shutdown` resolves, then close every telemetry stream.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let prefix = self.server.prefix().unwrap_or("").to_string();
        info!("relay: REST on http://{}{}", addr, prefix);
        info!("relay: WebSocket telemetry on ws://{}/ every {:?}", addr, self.state.relay.period());
        info!("relay: forwarding to {}", self.state.forwarder.base_url());
        for op in Operation::ALL {
            info!("  {:?} {}{}", op.method(), prefix, op.path());
        }
        info!("  Get {}/ports/scan", prefix);
        info!("  Post {}/auto-connect", prefix);

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let stop = self.shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("relay: shutting down");
                let _ = stop.send(true);
            })
            .await
    }
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok".into(), message: "UTMS relay is running".into() })
}

async fn forward(s: &AppState, op: Operation) -> Result<Json<Value>, ApiError> {
    s.forwarder.call(op).await.map(Json).map_err(|source| ApiError::Forward { op, source })
}

async fn forward_with<B: Serialize>(s: &AppState, op: Operation, body: &B) -> Result<Json<Value>, ApiError> {
    s.forwarder.send(op, body).await.map(Json).map_err(|source| ApiError::Forward { op, source })
}

async fn forward_body(s: &AppState, op: Operation, raw: &[u8]) -> Result<Json<Value>, ApiError> {
    let body = command_body(raw)?;
    forward_with(s, op, &body).await
}

/// The client's body, passed on untouched. Field types are the control
/// service's business (the UI sends form values as strings). An empty body
/// becomes `{}` so the service applies its defaults.
fn command_body(raw: &[u8]) -> Result<Value, ApiError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    let body: Value = serde_json::from_slice(raw)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {}", e)))?;
    if !body.is_object() {
        return Err(ApiError::BadRequest("request body must be a JSON object".into()));
    }
    Ok(body)
}

/// Any origin when the list is empty, like a stock `cors()` middleware.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("cors: ignoring invalid origin {:?}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn invoke(s: &AppState, sub: SubCommand, context: &'static str) -> Result<Json<Value>, ApiError> {
    s.invoker.invoke(sub).await.map(Json).map_err(|source| ApiError::Invoke { context, source })
}

async fn scan_ports(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    invoke(&s, SubCommand::ScanPorts, "Port scan failed").await
}

async fn auto_connect(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    invoke(&s, SubCommand::AutoConnect, "Auto-connect failed").await
}

async fn connect(State(s): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    forward_body(&s, Operation::Connect, &body).await
}

async fn disconnect(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    forward(&s, Operation::Disconnect).await
}

async fn telemetry(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    forward(&s, Operation::Telemetry).await
}

async fn arm(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    forward(&s, Operation::Arm).await
}

async fn disarm(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    forward(&s, Operation::Disarm).await
}

async fn takeoff(State(s): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    forward_body(&s, Operation::Takeoff, &body).await
}

async fn land(State(s): State<AppState>) -> Result<Json<Value>, ApiError> {
    forward(&s, Operation::Land).await
}

async fn mode(State(s): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    forward_body(&s, Operation::Mode, &body).await
}

async fn goto(State(s): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    forward_body(&s, Operation::Goto, &body).await
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(s): State<AppState>,
) -> Response {
    let relay = s.relay.clone();
    ws.on_upgrade(move |socket| relay.serve(socket, peer))
}
