use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use utms_proto::command::Operation;
use utms_proto::envelope::ResponseEnvelope;

/// Failure talking to the control service.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("control service sent invalid JSON: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("malformed telemetry: {0}")]
    Snapshot(#[source] serde_json::Error),
}

/// Failure running the controller process.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", exit_detail(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("no result after {0:?}")]
    Timeout(Duration),

    #[error("process produced no result line")]
    NoOutput,

    #[error("result line is not valid JSON ({source}): {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("result is not a JSON object: {0}")]
    NotAnObject(String),
}

fn exit_detail(code: &Option<i32>, stderr: &str) -> String {
    match (code, stderr.trim()) {
        (_, s) if !s.is_empty() => s.to_string(),
        (Some(c), _) => format!("process exited with status {}", c),
        (None, _) => "process killed by signal".to_string(),
    }
}

/// Anything a REST handler can fail with. Turned into the uniform
/// `{ success: false, message }` body in exactly one place: `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{source}")]
    Forward { op: Operation, source: ForwardError },

    #[error("{context}: {source}")]
    Invoke { context: &'static str, source: InvokeError },

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ResponseEnvelope {
        match self {
            ApiError::Forward { op: Operation::Telemetry, .. } => ResponseEnvelope::disconnected(self.to_string()),
            _ => ResponseEnvelope::failure(self.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
