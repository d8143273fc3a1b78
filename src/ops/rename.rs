//! Rename cascade: every place a pet's name is denormalised into the device
//! tree gets rewritten in one batch.

use serde_json::Value;

use crate::core::errors::{KibError, Result};
use crate::snapshot::DeviceSnapshot;
use crate::snapshot::model::feeding_uid;
use crate::store::path::validate_segment;
use crate::store::{StorePath, WriteBatch};

/// Build the batch that binds `uid` to `new_name`.
///
/// Touches the registry entry, `pet_name` on the uid's feeding records,
/// recent activities and daily feedings, the first occurrence of the old
/// registry name in any activity message, and `stats/last_fed_pet` when it
/// refers to `(uid)`.
pub fn plan_rename(
    snapshot: &DeviceSnapshot,
    device_root: &StorePath,
    uid: &str,
    new_name: &str,
) -> Result<WriteBatch> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(KibError::invalid_input("name", "pet name must not be empty"));
    }
    validate_segment(uid).map_err(|_| {
        KibError::invalid_input("uid", format!("{uid:?} is not a usable tag id"))
    })?;

    let name = Value::String(new_name.to_string());
    let mut batch = WriteBatch::new();
    batch.set(device_root.join("pet_registry")?.child(uid)?, name.clone());

    let history = device_root.child("feeding_history")?;
    for (key, record) in snapshot.feeding_history.iter() {
        if record.uid.as_deref() == Some(uid) {
            batch.set(history.child(key)?.child("pet_name")?, name.clone());
        }
    }

    let old_name = snapshot
        .pet_registry
        .get(uid)
        .filter(|old| !old.is_empty());
    let activities = device_root.child("recent_activities")?;
    for (key, activity) in snapshot.recent_activities.iter() {
        let entry = activities.child(key)?;
        if activity.uid.as_deref() == Some(uid) {
            batch.set(entry.child("pet_name")?, name.clone());
        }
        if let (Some(old), Some(message)) = (old_name, activity.message.as_deref())
            && message.contains(old.as_str())
        {
            batch.set(
                entry.child("message")?,
                Value::String(message.replacen(old.as_str(), new_name, 1)),
            );
        }
    }

    let daily = device_root.join("history/daily")?;
    for (date, entry) in snapshot.history.daily.iter() {
        for (key, feeding) in entry.feedings.iter() {
            if feeding_uid(feeding).as_deref() == Some(uid) {
                batch.set(
                    daily.child(date)?.child("feedings")?.child(key)?.child("pet_name")?,
                    name.clone(),
                );
            }
        }
    }

    if snapshot
        .stats
        .last_fed_pet
        .as_deref()
        .is_some_and(|pet| pet.contains(&format!("({uid})")))
    {
        batch.set(
            device_root.join("stats/last_fed_pet")?,
            Value::String(format!("{new_name} ({uid})")),
        );
    }

    Ok(batch)
}
