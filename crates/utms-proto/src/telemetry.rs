use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Latest known vehicle state as reported by the control service.
///
/// Only `connected` is always present: a control service with no vehicle
/// attached answers `{"connected": false}` and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    // Position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,

    // Speed / heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    // Battery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_remaining: Option<f64>,

    // GPS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u32>,

    // Attitude (radians)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,

    /// Fields the control service sends that we do not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetrySnapshot {
    pub fn from_value(v: Value) -> serde_json::Result<Self> {
        serde_json::from_value(v)
    }
}

/// Pushed instead of a snapshot when a poll tick fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollFailure {
    pub error: String,
    pub ts_unix_ms: i64,
}
