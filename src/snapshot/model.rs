//! Typed, lenient view of one `/devices/{id}` tree.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient::{OrderedMap, or_default, string_like, string_list};

/// Either epoch/uptime milliseconds or a timestamp string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Millis(f64),
    Text(String),
}

/// Wifi strength as reported: an RSSI in dBm or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WifiSignal {
    Rssi(f64),
    Text(String),
}

/// Root of a device tree. Every field is optional and decodes leniently.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(default, deserialize_with = "or_default")]
    pub device_status: DeviceStatus,
    #[serde(default)]
    pub feeding_history: OrderedMap<FeedingRecord>,
    #[serde(default)]
    pub pet_registry: OrderedMap<String>,
    #[serde(default)]
    pub last_fed_times: OrderedMap<TimeValue>,
    #[serde(default)]
    pub recent_activities: OrderedMap<ActivityRecord>,
    #[serde(default, deserialize_with = "or_default")]
    pub history: History,
    #[serde(default, deserialize_with = "or_default")]
    pub stats: StoredStats,
    #[serde(default, deserialize_with = "or_default")]
    pub portion_level: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub feeding_interval_hours: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub stale_food_alert: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub default_pet_names: Vec<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub notifications: NotificationState,
    #[serde(default, deserialize_with = "or_default")]
    pub battery_last_updated: Option<String>,
    /// Legacy location; `device_status.last_empty_time` wins when present.
    #[serde(default, deserialize_with = "or_default")]
    pub last_empty_time: Option<TimeValue>,
    #[serde(default, deserialize_with = "or_default")]
    pub sleep_settings: Option<SleepSettings>,
    #[serde(default, deserialize_with = "or_default")]
    pub tag_registration_mode: Option<bool>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_detected_tag: Option<DetectedTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceStatus {
    #[serde(default, deserialize_with = "or_default")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub battery_level: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub container_level: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub tray_level: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub wifi_signal: Option<WifiSignal>,
    /// Seconds since boot.
    #[serde(default, deserialize_with = "or_default")]
    pub uptime: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_seen: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_empty_time: Option<TimeValue>,
    #[serde(default, deserialize_with = "or_default")]
    pub feeding_interval_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeedingRecord {
    #[serde(default, deserialize_with = "string_like")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub pet_name: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActivityRecord {
    #[serde(default, deserialize_with = "or_default")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub pet_name: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct History {
    #[serde(default)]
    pub daily: OrderedMap<DailyEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyEntry {
    #[serde(default, deserialize_with = "or_default")]
    pub dispense_count: Option<f64>,
    /// Raw feeding entries; only their keys and `uid` fields are read.
    #[serde(default)]
    pub feedings: OrderedMap<Value>,
}

impl DailyEntry {
    /// Dispenses for the day: the stored counter when non-zero, else the
    /// number of recorded feedings.
    #[must_use]
    pub fn dispense_value(&self) -> u64 {
        match count(self.dispense_count) {
            0 => self.feedings.len() as u64,
            n => n,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoredStats {
    #[serde(default, deserialize_with = "or_default")]
    pub today_dispense_count: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub week_dispense_count: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub today_unique_pets: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub total_unique_uids: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_reset_date: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_fed_time: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub last_fed_pet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationState {
    #[serde(default)]
    pub read_status: OrderedMap<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SleepSettings {
    #[serde(default, deserialize_with = "or_default")]
    pub auto_wake_enabled: Option<bool>,
    #[serde(default, deserialize_with = "or_default")]
    pub auto_wake_hours: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub user_request_sleep: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DetectedTag {
    #[serde(default, deserialize_with = "string_like")]
    pub uid: Option<String>,
}

impl DeviceSnapshot {
    /// Decode a raw tree. Non-object roots (including `null`) give an empty snapshot.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if value.is_object() {
            Self::deserialize(value).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Tray-reset marker. The top-level field wins; the `device_status`
    /// copy is only consulted when the top-level one is absent.
    #[must_use]
    pub fn last_empty_time(&self) -> Option<&TimeValue> {
        self.last_empty_time
            .as_ref()
            .or(self.device_status.last_empty_time.as_ref())
    }

    /// Uid of the tag currently waiting to be registered.
    #[must_use]
    pub fn detected_tag_uid(&self) -> Option<&str> {
        self.last_detected_tag
            .as_ref()
            .and_then(|tag| tag.uid.as_deref())
            .filter(|uid| !uid.trim().is_empty())
    }
}

/// The `uid` of a raw daily feeding entry, if it has one.
#[must_use]
pub fn feeding_uid(entry: &Value) -> Option<String> {
    match entry.get("uid")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative whole count from a stored number; absent or invalid is 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn count(value: Option<f64>) -> u64 {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.floor() as u64)
}

/// Level clamped to `0..=100`; absent or invalid is 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percent(value: Option<f64>) -> u8 {
    value
        .filter(|v| v.is_finite())
        .map_or(0, |v| v.clamp(0.0, 100.0).round() as u8)
}

/// Render a stored number the way the device app does: no trailing `.0`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
