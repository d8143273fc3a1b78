//! Feeder settings: current values with defaults, validation, and the
//! batch that saves them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{KibError, Result};
use crate::snapshot::DeviceSnapshot;
use crate::store::{StorePath, WriteBatch};

pub const DEFAULT_PORTION_LEVEL: u32 = 100;
pub const DEFAULT_FEEDING_INTERVAL_HOURS: u32 = 2;
pub const DEFAULT_AUTO_WAKE_ENABLED: bool = true;
pub const DEFAULT_AUTO_WAKE_HOURS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub portion_level: u32,
    pub feeding_interval_hours: u32,
    pub auto_wake_enabled: bool,
    pub auto_wake_hours: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            portion_level: DEFAULT_PORTION_LEVEL,
            feeding_interval_hours: DEFAULT_FEEDING_INTERVAL_HOURS,
            auto_wake_enabled: DEFAULT_AUTO_WAKE_ENABLED,
            auto_wake_hours: DEFAULT_AUTO_WAKE_HOURS,
        }
    }
}

impl DeviceSettings {
    /// Settings as stored on the device; zero, negative or absent values
    /// fall back to defaults.
    #[must_use]
    pub fn current(snapshot: &DeviceSnapshot) -> Self {
        let defaults = Self::default();
        let sleep = snapshot.sleep_settings.clone().unwrap_or_default();
        Self {
            portion_level: positive(snapshot.portion_level).unwrap_or(defaults.portion_level),
            feeding_interval_hours: positive(snapshot.feeding_interval_hours)
                .unwrap_or(defaults.feeding_interval_hours),
            auto_wake_enabled: sleep.auto_wake_enabled.unwrap_or(defaults.auto_wake_enabled),
            auto_wake_hours: positive(sleep.auto_wake_hours).unwrap_or(defaults.auto_wake_hours),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.portion_level) {
            return Err(KibError::invalid_input(
                "portion_level",
                format!("{} is outside 1..=100", self.portion_level),
            ));
        }
        if !(1..=24).contains(&self.feeding_interval_hours) {
            return Err(KibError::invalid_input(
                "feeding_interval_hours",
                format!("{} is outside 1..=24", self.feeding_interval_hours),
            ));
        }
        if !(1..=24).contains(&self.auto_wake_hours) {
            return Err(KibError::invalid_input(
                "auto_wake_hours",
                format!("{} is outside 1..=24", self.auto_wake_hours),
            ));
        }
        Ok(())
    }

    /// Four-path save batch.
    pub fn to_batch(&self, device_root: &StorePath) -> Result<WriteBatch> {
        self.validate()?;
        let mut batch = WriteBatch::new();
        batch
            .set(device_root.child("portion_level")?, Value::from(self.portion_level))
            .set(
                device_root.child("feeding_interval_hours")?,
                Value::from(self.feeding_interval_hours),
            )
            .set(
                device_root.join("sleep_settings/auto_wake_enabled")?,
                Value::from(self.auto_wake_enabled),
            )
            .set(
                device_root.join("sleep_settings/auto_wake_hours")?,
                Value::from(self.auto_wake_hours),
            );
        Ok(batch)
    }
}

/// Partial edit applied over the current settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub portion_level: Option<u32>,
    pub feeding_interval_hours: Option<u32>,
    pub auto_wake_enabled: Option<bool>,
    pub auto_wake_hours: Option<u32>,
}

impl SettingsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn apply(&self, base: DeviceSettings) -> DeviceSettings {
        DeviceSettings {
            portion_level: self.portion_level.unwrap_or(base.portion_level),
            feeding_interval_hours: self
                .feeding_interval_hours
                .unwrap_or(base.feeding_interval_hours),
            auto_wake_enabled: self.auto_wake_enabled.unwrap_or(base.auto_wake_enabled),
            auto_wake_hours: self.auto_wake_hours.unwrap_or(base.auto_wake_hours),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn positive(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| v.min(f64::from(u32::MAX)).trunc() as u32)
}
