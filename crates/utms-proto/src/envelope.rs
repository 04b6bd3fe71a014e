use serde::{Deserialize, Serialize};

/// `{ success, message }` as returned for every failed relay call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub message: String,
    /// Set to `false` on telemetry failures so UIs can key off one flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

impl ResponseEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), connected: None }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), connected: Some(false) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
}
