//! Synthetic device trees for demos and manual testing.
//!
//! The generated tree has the same shape a real feeder writes: status
//! telemetry, a pet registry, two weeks of feeding history with matching
//! daily rollups, recent activities and stored counters.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};

use crate::snapshot::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub pets: usize,
    pub days: u32,
    /// Fixed seed for reproducible trees; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            pets: 3,
            days: 14,
            seed: None,
        }
    }
}

/// Build a plausible `devices/{id}` subtree ending at `clock.now()`.
#[must_use]
pub fn generate(clock: &Clock, names: &[String], options: &DemoOptions) -> Value {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let now = clock.now_utc();

    let pool: Vec<&str> = if names.is_empty() {
        vec!["Rex", "Mochi", "Yuki"]
    } else {
        names.iter().map(String::as_str).collect()
    };
    let mut registry = Map::new();
    let mut pets: Vec<(String, String)> = Vec::new();
    for i in 0..options.pets.max(1) {
        let uid = format!("{:08x}", rng.random::<u32>());
        let name = pool
            .choose(&mut rng)
            .map_or_else(|| format!("Pet {}", i + 1), |n| (*n).to_string());
        registry.insert(uid.clone(), Value::String(name.clone()));
        pets.push((uid, name));
    }

    let mut history = Map::new();
    let mut daily: Map<String, Value> = Map::new();
    let mut last_fed_times = Map::new();
    let mut feedings: Vec<(DateTime<Utc>, &str, &str)> = Vec::new();

    for day in (0..options.days).rev() {
        let date = clock.today() - Duration::days(i64::from(day));
        for (uid, name) in &pets {
            let visits = rng.random_range(0..=4);
            for _ in 0..visits {
                let at = clock.local_midnight(date)
                    + Duration::minutes(rng.random_range(6 * 60..22 * 60));
                if at <= now {
                    feedings.push((at, uid.as_str(), name.as_str()));
                }
            }
        }
    }
    feedings.sort_by_key(|(at, _, _)| *at);

    for (i, (at, uid, name)) in feedings.iter().enumerate() {
        let key = format!("feed_{i:05}");
        let ts = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let date = date_key(clock.local_date(*at));
        history.insert(
            key.clone(),
            json!({"uid": uid, "pet_name": name, "date": date, "timestamp": ts}),
        );
        last_fed_times.insert((*uid).to_string(), Value::String(ts.clone()));

        let day = daily
            .entry(date)
            .or_insert_with(|| json!({"dispense_count": 0, "feedings": {}}));
        if let Some(count) = day.get("dispense_count").and_then(Value::as_u64) {
            day["dispense_count"] = Value::from(count + 1);
        }
        if let Some(map) = day.get_mut("feedings").and_then(Value::as_object_mut) {
            map.insert(key, json!({"uid": uid, "pet_name": name, "timestamp": ts}));
        }
    }

    let mut activities = Map::new();
    for (i, (at, uid, name)) in feedings.iter().rev().take(5).enumerate() {
        activities.insert(
            format!("act_{i:02}"),
            json!({
                "message": format!("{name} was fed"),
                "pet_name": name,
                "uid": uid,
                "timestamp": at.to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        );
    }

    let today_key = date_key(clock.today());
    let today_count = daily
        .get(&today_key)
        .and_then(|d| d.get("dispense_count"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let (last_fed_time, last_fed_pet) = feedings.last().map_or(
        (Value::Null, json!("None")),
        |(at, uid, name)| {
            (
                Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                Value::String(format!("{name} ({uid})")),
            )
        },
    );

    let battery_updated = now - Duration::minutes(rng.random_range(1..120));
    let uptime_s = rng.random_range(3_600..86_400 * 3);
    let empty_after_s = rng.random_range(0..uptime_s);
    let battery = rng.random_range(5..=100);
    let container = rng.random_range(5..=100);

    json!({
        "device_status": {
            "status": if rng.random_bool(0.85) { "online" } else { "offline" },
            "battery_level": battery,
            "container_level": container,
            "tray_level": rng.random_range(0..=100),
            "wifi_signal": -rng.random_range(40..85),
            "uptime": uptime_s,
            "last_seen": clock.now_iso(),
            "last_empty_time": empty_after_s * 1000,
        },
        "battery_last_updated": battery_updated.to_rfc3339_opts(SecondsFormat::Millis, true),
        "pet_registry": registry,
        "feeding_history": history,
        "last_fed_times": last_fed_times,
        "recent_activities": activities,
        "history": {"daily": daily},
        "stats": {
            "today_dispense_count": today_count,
            "last_reset_date": today_key,
            "last_fed_time": last_fed_time,
            "last_fed_pet": last_fed_pet,
        },
        "portion_level": 100,
        "feeding_interval_hours": 2,
        "stale_food_alert": if rng.random_bool(0.2) { "Active" } else { "Clear" },
        "default_pet_names": pool,
        "sleep_settings": {"auto_wake_enabled": true, "auto_wake_hours": 4},
    })
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::snapshot::DeviceSnapshot;

    fn clock() -> Clock {
        Clock::from_rfc3339("2026-10-17T18:00:00+02:00").expect("clock")
    }

    fn seeded(seed: u64) -> Value {
        let options = DemoOptions {
            seed: Some(seed),
            ..DemoOptions::default()
        };
        generate(&clock(), &[], &options)
    }

    #[test]
    fn seeded_trees_are_reproducible() {
        assert_eq!(seeded(7), seeded(7));
    }

    #[test]
    fn tree_has_registry_and_consistent_rollups() {
        let tree = seeded(42);
        let snap = DeviceSnapshot::from_value(&tree);
        assert_eq!(snap.pet_registry.len(), 3);

        let rolled: u64 = snap.history.daily.values().map(|d| d.dispense_value()).sum();
        assert_eq!(rolled, snap.feeding_history.len() as u64);

        let now = clock().now_utc();
        for record in snap.feeding_history.values() {
            let at = record
                .timestamp
                .as_deref()
                .and_then(|t| clock().parse(t))
                .expect("timestamp");
            assert!(at <= now);
        }
    }

    #[test]
    fn generated_tree_derives_without_surprises() {
        let snap = DeviceSnapshot::from_value(&seeded(3));
        let view = Aggregator::default().derive(&snap, &clock());
        assert_eq!(view.pets.pet_stats.len(), 3);
        assert_eq!(view.dashboard.chart.values.len(), 7);
    }
}
