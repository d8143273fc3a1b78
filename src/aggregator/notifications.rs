//! Notification deriver: device alerts plus one activity item per recent
//! activity, merged with stored read flags.
//!
//! Ids are `prefix:timestamp`, so a condition that stays true keeps its id
//! until the triggering timestamp changes.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AggregatorConfig;
use crate::snapshot::DeviceSnapshot;
use crate::snapshot::model::{TimeValue, format_number};
use crate::snapshot::time::{Clock, relative_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Activity,
    Reminder,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Activity => "activity",
            Self::Reminder => "reminder",
        }
    }
}

/// Feed filter as offered by the notification screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFilter {
    #[default]
    All,
    Alert,
    Activity,
    Reminder,
}

impl NotificationFilter {
    #[must_use]
    pub fn matches(self, kind: NotificationKind) -> bool {
        match self {
            Self::All => true,
            Self::Alert => kind == NotificationKind::Alert,
            Self::Activity => kind == NotificationKind::Activity,
            Self::Reminder => kind == NotificationKind::Reminder,
        }
    }
}

impl fmt::Display for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Alert => "alert",
            Self::Activity => "activity",
            Self::Reminder => "reminder",
        })
    }
}

impl FromStr for NotificationFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "alert" | "alerts" => Ok(Self::Alert),
            "activity" | "activities" => Ok(Self::Activity),
            "reminder" | "reminders" => Ok(Self::Reminder),
            other => Err(format!(
                "unknown filter {other:?} (expected all|alert|activity|reminder)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: String,
    pub relative_time: String,
    pub read: bool,
    pub icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationFeed {
    pub items: Vec<NotificationItem>,
    pub unread_count: usize,
}

impl NotificationFeed {
    pub fn filtered(&self, filter: NotificationFilter) -> impl Iterator<Item = &NotificationItem> {
        self.items.iter().filter(move |n| filter.matches(n.kind))
    }

    /// Ids of every unread item, in feed order.
    #[must_use]
    pub fn unread_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.as_str())
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NotificationItem> {
        self.items.iter().find(|n| n.id == id)
    }
}

/// Map a notification id onto a key the store accepts (`. # $ [ ] /` become `_`).
#[must_use]
pub fn storage_key(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '.' | '#' | '$' | '[' | ']' | '/' => '_',
            other => other,
        })
        .collect()
}

/// An item before its id, read flag and relative time are resolved.
struct Draft {
    prefix: &'static str,
    timestamp: String,
    kind: NotificationKind,
    title: String,
    message: String,
    icon: &'static str,
    pet_name: Option<String>,
}

impl Draft {
    fn alert(prefix: &'static str, timestamp: String, title: &str, message: String, icon: &'static str) -> Self {
        Self {
            prefix,
            timestamp,
            kind: NotificationKind::Alert,
            title: title.to_string(),
            message,
            icon,
            pet_name: None,
        }
    }

    fn finish(self, snapshot: &DeviceSnapshot, clock: &Clock) -> (Option<DateTime<Utc>>, NotificationItem) {
        let parsed = clock.parse(&self.timestamp);
        let id = format!("{}:{}", self.prefix, self.timestamp);
        let read_status = &snapshot.notifications.read_status;
        let read = read_status
            .get(&storage_key(&id))
            .or_else(|| read_status.get(&id))
            .copied()
            .unwrap_or(false);
        let item = NotificationItem {
            id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            relative_time: parsed
                .map_or_else(|| "Invalid date".to_string(), |t| relative_label(clock, t)),
            timestamp: self.timestamp,
            read,
            icon: self.icon,
            pet_name: self.pet_name,
        };
        (parsed, item)
    }
}

#[must_use]
pub fn derive(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> NotificationFeed {
    let mut drafts = Vec::new();
    let ds = &snapshot.device_status;

    if let Some(level) = ds.battery_level.filter(|l| l.is_finite())
        && level < config.battery_low_pct
    {
        drafts.push(Draft::alert(
            "battery",
            non_empty(snapshot.battery_last_updated.as_deref()).unwrap_or_else(|| clock.now_iso()),
            "Low Battery",
            format!("Battery at {}% - charge soon", format_number(level)),
            "battery-alert",
        ));
    }

    if let Some(level) = ds.container_level.filter(|l| l.is_finite())
        && level < config.container_low_pct
    {
        drafts.push(Draft::alert(
            "container",
            non_empty(ds.last_seen.as_deref()).unwrap_or_else(|| clock.now_iso()),
            "Low Container",
            format!("Food container at {}% - refill soon", format_number(level)),
            "food-alert",
        ));
    }

    if snapshot.stale_food_alert.as_deref() == Some("Active") {
        let ts = match snapshot.last_empty_time() {
            Some(TimeValue::Text(raw)) if !raw.trim().is_empty() => raw.clone(),
            #[allow(clippy::cast_possible_truncation)]
            Some(TimeValue::Millis(ms)) if ms.is_finite() => format!("{}", ms.trunc() as i64),
            _ => clock.now_iso(),
        };
        drafts.push(Draft::alert(
            "stale",
            ts,
            "Stale Food",
            "Food in tray over 24 hours - clean soon".to_string(),
            "warning",
        ));
    }

    for (key, activity) in snapshot.recent_activities.iter() {
        let pet_name = activity.pet_name.clone().filter(|p| !p.is_empty());
        drafts.push(Draft {
            prefix: "activity",
            timestamp: non_empty(activity.timestamp.as_deref()).unwrap_or_else(|| key.to_string()),
            kind: NotificationKind::Activity,
            title: pet_name
                .as_deref()
                .map_or_else(|| "Feeding Activity".to_string(), |p| format!("{p}'s Activity")),
            message: activity
                .message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Activity recorded".to_string()),
            icon: "paw",
            pet_name,
        });
    }

    let mut pending: Vec<(Option<DateTime<Utc>>, NotificationItem)> = drafts
        .into_iter()
        .map(|draft| draft.finish(snapshot, clock))
        .collect();
    // Newest first; unparseable timestamps (None) sort last, ties keep order.
    pending.sort_by(|a, b| b.0.cmp(&a.0));
    let items: Vec<NotificationItem> = pending.into_iter().map(|(_, item)| item).collect();
    let unread_count = items.iter().filter(|n| !n.read).count();
    NotificationFeed {
        items,
        unread_count,
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty()).map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clock() -> Clock {
        Clock::from_rfc3339("2026-10-17T18:00:00+00:00").expect("clock")
    }

    fn feed(tree: serde_json::Value) -> NotificationFeed {
        derive(
            &DeviceSnapshot::from_value(&tree),
            &clock(),
            &AggregatorConfig::default(),
        )
    }

    #[test]
    fn low_battery_alone_yields_one_alert() {
        let feed = feed(json!({
            "device_status": {"battery_level": 15, "container_level": 80},
            "battery_last_updated": "2026-10-17T17:00:00Z",
        }));
        assert_eq!(feed.items.len(), 1);
        let item = &feed.items[0];
        assert_eq!(item.kind, NotificationKind::Alert);
        assert_eq!(item.title, "Low Battery");
        assert!(item.message.contains("15%"));
        assert_eq!(item.id, "battery:2026-10-17T17:00:00Z");
        assert_eq!(item.relative_time, "1h ago");
        assert_eq!(feed.unread_count, 1);
    }

    #[test]
    fn absent_levels_never_fire() {
        let feed = feed(json!({"device_status": {"status": "online"}}));
        assert!(feed.items.is_empty());
    }

    #[test]
    fn missing_timestamps_fall_back_to_now() {
        let feed = feed(json!({
            "device_status": {"container_level": 12},
            "stale_food_alert": "Active",
        }));
        let ids: Vec<&str> = feed.items.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"container:2026-10-17T18:00:00.000Z"));
        assert!(ids.contains(&"stale:2026-10-17T18:00:00.000Z"));
        let container = feed
            .items
            .iter()
            .find(|n| n.id.starts_with("container"))
            .expect("container alert");
        assert_eq!(container.message, "Food container at 12% - refill soon");
    }

    #[test]
    fn activities_sorted_newest_first_with_titles() {
        let feed = feed(json!({"recent_activities": {
            "a1": {"message": "Rex ate 20g", "pet_name": "Rex", "timestamp": "2026-10-17T08:00:00Z"},
            "a2": {"timestamp": "2026-10-17T12:00:00Z"},
            "a3": {"message": "odd", "timestamp": "garbled"},
        }}));
        let titles: Vec<&str> = feed.items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Feeding Activity", "Rex's Activity", "Feeding Activity"]);
        assert_eq!(feed.items[0].message, "Activity recorded");
        assert_eq!(feed.items[2].relative_time, "Invalid date");
        assert_eq!(feed.items[1].pet_name.as_deref(), Some("Rex"));
    }

    #[test]
    fn read_status_merges_through_storage_keys() {
        let key = storage_key("activity:2026-10-17T08:00:00.000Z");
        let feed = feed(json!({
            "recent_activities": {"a1": {"timestamp": "2026-10-17T08:00:00.000Z"}},
            "notifications": {"read_status": {key: true}},
        }));
        assert!(feed.items[0].read);
        assert_eq!(feed.unread_count, 0);
        assert!(feed.unread_ids().is_empty());
    }

    #[test]
    fn storage_keys_replace_reserved_characters() {
        assert_eq!(
            storage_key("stale:2026-10-17T18:00:00.000Z"),
            "stale:2026-10-17T18:00:00_000Z"
        );
        assert_eq!(storage_key("a.b#c$d[e]f/g"), "a_b_c_d_e_f_g");
    }

    #[test]
    fn filters_by_kind() {
        let feed = feed(json!({
            "device_status": {"battery_level": 10},
            "recent_activities": {"a1": {"timestamp": "2026-10-17T08:00:00Z"}},
        }));
        assert_eq!(feed.filtered(NotificationFilter::Alert).count(), 1);
        assert_eq!(feed.filtered(NotificationFilter::Activity).count(), 1);
        assert_eq!(feed.filtered(NotificationFilter::Reminder).count(), 0);
        assert_eq!(feed.filtered(NotificationFilter::All).count(), 2);
        assert_eq!("alerts".parse::<NotificationFilter>(), Ok(NotificationFilter::Alert));
    }
}
