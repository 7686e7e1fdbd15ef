//! Payload shapes pushed by the feed and served by the REST snapshot
//! endpoints. Identical for both sources.

use chrono::{DateTime, Utc};
use lib_realtime::core::envelope::lenient_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ENVIRONMENT_UPDATE: &str = "environment.update";
pub const DEVICE_UPDATE: &str = "device.update";
pub const ALARM_RAISE: &str = "alarm.raise";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default = "default_location")]
    pub location: String,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default, alias = "aqi")]
    pub air_quality_index: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_location() -> String {
    "default".to_string()
}

/// Last known state of one device. Only `device_id` and `status` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub id: Option<i64>,
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeviceStatus {
    /// Display class for the device board.
    pub fn status_class(&self) -> &'static str {
        status_class(&self.status)
    }
}

pub fn status_class(status: &str) -> &'static str {
    match status {
        "online" => "success",
        "offline" => "danger",
        "maintenance" => "warning",
        _ => "info",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    #[serde(default)]
    pub id: Option<i64>,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}
