use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Every call the relay knows how to forward to the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    Connect,
    Disconnect,
    Telemetry,
    Arm,
    Disarm,
    Takeoff,
    Land,
    Mode,
    Goto,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Health,
        Operation::Connect,
        Operation::Disconnect,
        Operation::Telemetry,
        Operation::Arm,
        Operation::Disarm,
        Operation::Takeoff,
        Operation::Land,
        Operation::Mode,
        Operation::Goto,
    ];

    pub fn method(self) -> Method {
        match self {
            Operation::Health | Operation::Telemetry => Method::Get,
            _ => Method::Post,
        }
    }

    /// Path on the control service, also used as the relay's own route.
    pub fn path(self) -> &'static str {
        match self {
            Operation::Health => "/health",
            Operation::Connect => "/connect",
            Operation::Disconnect => "/disconnect",
            Operation::Telemetry => "/telemetry",
            Operation::Arm => "/arm",
            Operation::Disarm => "/disarm",
            Operation::Takeoff => "/takeoff",
            Operation::Land => "/land",
            Operation::Mode => "/mode",
            Operation::Goto => "/goto",
        }
    }

    pub fn name(self) -> &'static str {
        &self.path()[1..]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Absent fields are left out so the control service applies its own defaults.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeoffRequest {
    /// Metres above home.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoRequest {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}
