//! Dashboard stats deriver: headline counters, the dispense chart, tray
//! freshness, device status and the recent-activity list.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::AggregatorConfig;
use crate::snapshot::model::{TimeValue, WifiSignal, count, format_number, percent};
use crate::snapshot::DeviceSnapshot;
use crate::snapshot::time::{
    Clock, clock_time, display_instant, display_timestamp, month_day, month_day_of, uptime_hms,
    week_start_of,
};

// ──────────────────── types ────────────────────

/// Dispense chart window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartPeriod {
    #[serde(rename = "7days")]
    SevenDays,
    #[serde(rename = "4weeks")]
    FourWeeks,
    #[serde(rename = "6months")]
    SixMonths,
}

impl ChartPeriod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenDays => "7days",
            Self::FourWeeks => "4weeks",
            Self::SixMonths => "6months",
        }
    }
}

impl fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7days" | "7d" | "week" => Ok(Self::SevenDays),
            "4weeks" | "4w" | "month" => Ok(Self::FourWeeks),
            "6months" | "6m" => Ok(Self::SixMonths),
            other => Err(format!(
                "unknown period {other:?} (expected 7days|4weeks|6months)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiQuality {
    Excellent,
    Strong,
    Good,
    Weak,
    Unknown,
}

impl WifiQuality {
    #[must_use]
    pub fn from_signal(signal: Option<&WifiSignal>) -> Self {
        match signal {
            Some(WifiSignal::Rssi(rssi)) if rssi.is_finite() => {
                if *rssi >= -50.0 {
                    Self::Excellent
                } else if *rssi >= -60.0 {
                    Self::Strong
                } else if *rssi >= -70.0 {
                    Self::Good
                } else {
                    Self::Weak
                }
            }
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Strong => "Strong",
            Self::Good => "Good",
            Self::Weak => "Weak",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryTier {
    Full,
    Good,
    Low,
    Critical,
}

impl BatteryTier {
    #[must_use]
    pub const fn from_level(level: u8) -> Self {
        match level {
            75..=u8::MAX => Self::Full,
            30..=74 => Self::Good,
            10..=29 => Self::Low,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatusView {
    pub status: String,
    pub is_online: bool,
    pub battery_level: u8,
    pub battery_tier: BatteryTier,
    pub container_level: u8,
    pub tray_level: u8,
    pub wifi_signal: String,
    pub wifi_quality: WifiQuality,
    pub uptime_secs: u64,
    pub last_seen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub today_dispense_count: u64,
    pub week_dispense_count: u64,
    pub today_unique_pets: u64,
    pub total_unique_uids: u64,
    pub last_reset_date: String,
    pub last_fed_at: Option<DateTime<Utc>>,
    pub last_fed_time: String,
    pub last_fed_pet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub period: ChartPeriod,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

/// Where the tray-reset marker came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTimeSource {
    Never,
    DeviceUptime,
    WallClock,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Freshness {
    pub last_empty_time: String,
    pub time_since_reset: String,
    pub is_stale: bool,
    pub source: EmptyTimeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentSettings {
    pub portion_level: u8,
    pub feeding_interval_hours: String,
    pub stale_food_alert: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityItem {
    pub key: String,
    pub message: String,
    pub pet_name: String,
    pub uid: Option<String>,
    pub timestamp: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub device_status: DeviceStatusView,
    pub stats: DashboardStats,
    pub chart: ChartSeries,
    pub freshness: Freshness,
    pub current_settings: CurrentSettings,
    pub recent_activities: Vec<ActivityItem>,
}

// ──────────────────── derivation ────────────────────

/// Derive the dashboard with the configured chart period.
#[must_use]
pub fn derive(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> DashboardView {
    derive_with_period(snapshot, clock, config, config.period)
}

#[must_use]
pub fn derive_with_period(
    snapshot: &DeviceSnapshot,
    clock: &Clock,
    config: &AggregatorConfig,
    period: ChartPeriod,
) -> DashboardView {
    DashboardView {
        device_status: device_status(snapshot),
        stats: stats(snapshot, clock, config),
        chart: chart(snapshot, clock, period),
        freshness: freshness(snapshot, clock, config.stale_after_hours),
        current_settings: current_settings(snapshot),
        recent_activities: recent_activities(snapshot, clock),
    }
}

fn device_status(snapshot: &DeviceSnapshot) -> DeviceStatusView {
    let ds = &snapshot.device_status;
    let status = ds
        .status
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "offline".to_string());
    let battery_level = percent(ds.battery_level);
    let wifi_signal = match &ds.wifi_signal {
        Some(WifiSignal::Rssi(v)) => format_number(*v),
        Some(WifiSignal::Text(s)) => s.clone(),
        None => "Unknown".to_string(),
    };
    DeviceStatusView {
        is_online: status == "online",
        status,
        battery_level,
        battery_tier: BatteryTier::from_level(battery_level),
        container_level: percent(ds.container_level),
        tray_level: percent(ds.tray_level),
        wifi_signal,
        wifi_quality: WifiQuality::from_signal(ds.wifi_signal.as_ref()),
        uptime_secs: count(ds.uptime),
        last_seen: ds.last_seen.clone().unwrap_or_default(),
    }
}

fn stats(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> DashboardStats {
    let stored = &snapshot.stats;
    let (last_fed_at, last_fed_time) = last_fed(snapshot, clock);
    DashboardStats {
        today_dispense_count: count(stored.today_dispense_count),
        week_dispense_count: week_dispense_count(snapshot, clock, config),
        today_unique_pets: count(stored.today_unique_pets),
        total_unique_uids: count(stored.total_unique_uids),
        last_reset_date: stored
            .last_reset_date
            .clone()
            .unwrap_or_else(|| clock.today().format("%Y-%m-%d").to_string()),
        last_fed_at,
        last_fed_time,
        last_fed_pet: stored
            .last_fed_pet
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "None".to_string()),
    }
}

/// Sum of stored daily dispense counters from the start of the current week.
fn week_dispense_count(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> u64 {
    let week_start = week_start_of(clock.today(), config.dashboard_week_start);
    snapshot
        .history
        .daily
        .iter()
        .filter_map(|(key, entry)| {
            let date = clock.parse_date_key(key)?;
            (date >= week_start).then(|| count(entry.dispense_count))
        })
        .sum()
}

/// Key and instant of the latest feeding, by timestamp or else record key.
/// Equal instants keep the earlier record.
fn latest_feeding<'a>(
    snapshot: &'a DeviceSnapshot,
    clock: &Clock,
) -> Option<(&'a str, DateTime<Utc>)> {
    let mut latest: Option<(&str, DateTime<Utc>)> = None;
    for (key, record) in snapshot.feeding_history.iter() {
        let parsed = match record.timestamp.as_deref() {
            Some(ts) => clock.parse(ts),
            None => clock.parse(key),
        };
        if let Some(t) = parsed
            && latest.is_none_or(|(_, best)| t > best)
        {
            latest = Some((key, t));
        }
    }
    latest
}

/// Latest feeding, then the stored value, then now.
fn last_fed(snapshot: &DeviceSnapshot, clock: &Clock) -> (Option<DateTime<Utc>>, String) {
    if let Some((_, t)) = latest_feeding(snapshot, clock) {
        return (Some(t), display_instant(clock, t));
    }
    match snapshot.stats.last_fed_time.as_deref() {
        Some(raw) if !raw.trim().is_empty() => (clock.parse(raw), display_timestamp(clock, raw)),
        _ => (Some(clock.now_utc()), display_instant(clock, clock.now_utc())),
    }
}

// ──────────────────── chart ────────────────────

fn chart(snapshot: &DeviceSnapshot, clock: &Clock, period: ChartPeriod) -> ChartSeries {
    let per_day = per_day_values(snapshot, clock);
    let value_on = |date: NaiveDate| per_day.get(&date).copied().unwrap_or(0);
    let today = clock.today();

    let (labels, values): (Vec<String>, Vec<u64>) = match period {
        ChartPeriod::SevenDays => (0..7)
            .rev()
            .map(|back| {
                let date = today - Duration::days(back);
                (month_day_of(date), value_on(date))
            })
            .unzip(),
        ChartPeriod::FourWeeks => (0..4)
            .rev()
            .map(|week| {
                let end = today - Duration::days(7 * week);
                let start = end - Duration::days(6);
                let total = (0..7)
                    .map(|d| value_on(start + Duration::days(d)))
                    .sum::<u64>();
                (month_day_of(start), total)
            })
            .unzip(),
        ChartPeriod::SixMonths => (0..6)
            .rev()
            .map(|back| {
                let (year, month) = months_back(today.year(), today.month(), back);
                let total = per_day
                    .iter()
                    .filter(|(date, _)| date.year() == year && date.month() == month)
                    .map(|(_, v)| *v)
                    .sum::<u64>();
                let label = NaiveDate::from_ymd_opt(year, month, 1)
                    .map(|d| d.format("%b").to_string())
                    .unwrap_or_default();
                (label, total)
            })
            .unzip(),
    };

    ChartSeries {
        period,
        labels,
        values,
    }
}

/// Daily values keyed by calendar date; keys naming the same date are summed.
fn per_day_values(snapshot: &DeviceSnapshot, clock: &Clock) -> HashMap<NaiveDate, u64> {
    let mut out = HashMap::new();
    for (key, entry) in snapshot.history.daily.iter() {
        if let Some(date) = clock.parse_date_key(key) {
            *out.entry(date).or_insert(0) += entry.dispense_value();
        }
    }
    out
}

fn months_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + i32::try_from(month).unwrap_or(1) - 1 - i32::try_from(back).unwrap_or(0);
    let month = u32::try_from(index.rem_euclid(12)).unwrap_or(0) + 1;
    (index.div_euclid(12), month)
}

// ──────────────────── freshness ────────────────────

fn freshness(snapshot: &DeviceSnapshot, clock: &Clock, stale_after_hours: f64) -> Freshness {
    match snapshot.last_empty_time() {
        None => Freshness {
            last_empty_time: "Never".to_string(),
            time_since_reset: "N/A".to_string(),
            is_stale: false,
            source: EmptyTimeSource::Never,
        },
        Some(TimeValue::Millis(ms)) => uptime_freshness(snapshot, *ms, stale_after_hours),
        Some(TimeValue::Text(raw)) => wall_clock_freshness(clock, raw, stale_after_hours),
    }
}

/// Numeric markers are device-uptime milliseconds, comparable only to `uptime`.
fn uptime_freshness(snapshot: &DeviceSnapshot, ms: f64, stale_after_hours: f64) -> Freshness {
    let ds = &snapshot.device_status;
    let uptime = ds.uptime.filter(|u| u.is_finite() && *u > 0.0).unwrap_or(0.0);
    let ms = if ms.is_finite() { ms } else { 0.0 };
    let online = ds.status.as_deref() == Some("online");

    let time_since_reset = if online && uptime > 0.0 {
        let since_ms = (uptime * 1000.0 - ms).max(0.0);
        hours_mins(since_ms / 1000.0)
    } else {
        "N/A".to_string()
    };

    let hours_since = (uptime - ms / 1000.0) / 3600.0;
    Freshness {
        last_empty_time: format!("{} (device uptime)", uptime_hms(ms)),
        time_since_reset,
        is_stale: hours_since > stale_after_hours,
        source: EmptyTimeSource::DeviceUptime,
    }
}

fn wall_clock_freshness(clock: &Clock, raw: &str, stale_after_hours: f64) -> Freshness {
    let Some(t) = clock.parse(raw) else {
        return Freshness {
            last_empty_time: "Invalid date".to_string(),
            time_since_reset: "N/A".to_string(),
            is_stale: false,
            source: EmptyTimeSource::Invalid,
        };
    };

    #[allow(clippy::cast_precision_loss)]
    let since_secs = (clock.now_utc() - t).num_milliseconds() as f64 / 1000.0;
    let local = clock.local(t);
    let last_empty_time = if local.date_naive() == clock.today() {
        format!("Today, {}", clock_time(local))
    } else {
        format!("{}, {}", month_day(local), clock_time(local))
    };
    Freshness {
        last_empty_time,
        time_since_reset: hours_mins(since_secs.max(0.0)),
        is_stale: since_secs / 3600.0 > stale_after_hours,
        source: EmptyTimeSource::WallClock,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hours_mins(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{} hours {} mins", total / 3_600, (total % 3_600) / 60)
}

// ──────────────────── settings + activity ────────────────────

fn current_settings(snapshot: &DeviceSnapshot) -> CurrentSettings {
    let portion = match percent(snapshot.portion_level) {
        0 => 100,
        p => p,
    };
    let interval = snapshot
        .feeding_interval_hours
        .or(snapshot.device_status.feeding_interval_hours)
        .filter(|h| h.is_finite() && *h > 0.0)
        .unwrap_or(2.0);
    CurrentSettings {
        portion_level: portion,
        feeding_interval_hours: format_number(interval),
        stale_food_alert: snapshot
            .stale_food_alert
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Clear".to_string()),
    }
}

fn recent_activities(snapshot: &DeviceSnapshot, clock: &Clock) -> Vec<ActivityItem> {
    let mut items: Vec<(Option<DateTime<Utc>>, ActivityItem)> = snapshot
        .recent_activities
        .iter()
        .filter_map(|(key, record)| {
            let raw = record.timestamp.as_deref().filter(|t| !t.trim().is_empty())?;
            Some((
                clock.parse(raw),
                ActivityItem {
                    key: key.to_string(),
                    message: record.message.clone().unwrap_or_default(),
                    pet_name: record
                        .pet_name
                        .clone()
                        .filter(|p| !p.is_empty())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    uid: record.uid.clone(),
                    timestamp: raw.to_string(),
                    time: display_timestamp(clock, raw),
                },
            ))
        })
        .collect();
    items.sort_by(|a, b| b.0.cmp(&a.0));
    items.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2026-10-17 is a Saturday.
    fn clock() -> Clock {
        Clock::from_rfc3339("2026-10-17T18:00:00+00:00").expect("clock")
    }

    fn derive_json(tree: serde_json::Value) -> DashboardView {
        derive(
            &DeviceSnapshot::from_value(&tree),
            &clock(),
            &AggregatorConfig::default(),
        )
    }

    #[test]
    fn empty_tree_yields_neutral_defaults() {
        let view = derive_json(json!({}));
        assert_eq!(view.device_status.status, "offline");
        assert!(!view.device_status.is_online);
        assert_eq!(view.device_status.wifi_signal, "Unknown");
        assert_eq!(view.device_status.wifi_quality, WifiQuality::Unknown);
        assert_eq!(view.stats.today_dispense_count, 0);
        assert_eq!(view.stats.last_fed_pet, "None");
        assert_eq!(view.stats.last_reset_date, "2026-10-17");
        assert_eq!(view.stats.last_fed_time, "Today, 06:00 PM");
        assert_eq!(view.current_settings.portion_level, 100);
        assert_eq!(view.current_settings.stale_food_alert, "Clear");
        assert_eq!(view.freshness.last_empty_time, "Never");
        assert_eq!(view.freshness.time_since_reset, "N/A");
        assert!(!view.freshness.is_stale);
    }

    #[test]
    fn week_count_starts_monday_and_ignores_feedings_fallback() {
        let view = derive_json(json!({"history": {"daily": {
            "2026-10-11": {"dispense_count": 50},
            "2026-10-12": {"dispense_count": 3},
            "2026-10-15": {"dispense_count": 0, "feedings": {"a": {}, "b": {}}},
            "2026-10-17": {"dispense_count": 4},
        }}}));
        assert_eq!(view.stats.week_dispense_count, 7);
    }

    #[test]
    fn seven_day_chart_uses_counter_then_feedings() {
        let view = derive_json(json!({"history": {"daily": {
            "2026-10-11": {"dispense_count": 9},
            "2026-10-12": {"dispense_count": 2},
            "2026-10-16": {"feedings": {"a": {}, "b": {}, "c": {}}},
            "2026-10-17": {"dispense_count": 5},
        }}}));
        assert_eq!(
            view.chart.labels,
            vec!["Oct 11", "Oct 12", "Oct 13", "Oct 14", "Oct 15", "Oct 16", "Oct 17"]
        );
        assert_eq!(view.chart.values, vec![9, 2, 0, 0, 0, 3, 5]);
    }

    #[test]
    fn four_week_chart_sums_seven_day_buckets() {
        let snap = DeviceSnapshot::from_value(&json!({"history": {"daily": {
            "2026-09-20": {"dispense_count": 1},
            "2026-09-26": {"dispense_count": 1},
            "2026-10-11": {"dispense_count": 4},
            "2026-10-17": {"dispense_count": 6},
        }}}));
        let view =
            derive_with_period(&snap, &clock(), &AggregatorConfig::default(), ChartPeriod::FourWeeks);
        assert_eq!(view.chart.labels, vec!["Sep 20", "Sep 27", "Oct 4", "Oct 11"]);
        assert_eq!(view.chart.values, vec![2, 0, 0, 10]);
    }

    #[test]
    fn six_month_chart_groups_by_calendar_month() {
        let snap = DeviceSnapshot::from_value(&json!({"history": {"daily": {
            "2026-04-30": {"dispense_count": 100},
            "2026-05-01": {"dispense_count": 2},
            "2026-05-31": {"dispense_count": 3},
            "2026-10-01": {"feedings": {"a": {}}},
        }}}));
        let view =
            derive_with_period(&snap, &clock(), &AggregatorConfig::default(), ChartPeriod::SixMonths);
        assert_eq!(view.chart.labels, vec!["May", "Jun", "Jul", "Aug", "Sep", "Oct"]);
        assert_eq!(view.chart.values, vec![5, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn months_back_wraps_years() {
        assert_eq!(months_back(2026, 2, 3), (2025, 11));
        assert_eq!(months_back(2026, 10, 0), (2026, 10));
    }

    #[test]
    fn last_fed_picks_latest_timestamp_or_key() {
        let view = derive_json(json!({"feeding_history": {
            "r1": {"timestamp": "2026-10-17T09:00:00Z"},
            "2026-10-17T11:30:00Z": {"uid": "abc"},
            "r3": {"timestamp": "garbage"},
            "r4": {"timestamp": "2026-10-16T23:00:00Z"},
        }}));
        assert_eq!(view.stats.last_fed_time, "Today, 11:30 AM");
        assert_eq!(
            view.stats.last_fed_at.map(|t| t.to_rfc3339()),
            Some("2026-10-17T11:30:00+00:00".to_string())
        );
    }

    #[test]
    fn last_fed_tie_keeps_first_record() {
        let snap = DeviceSnapshot::from_value(&json!({"feeding_history": {
            "r1": {"timestamp": "2026-10-17T08:00:00Z"},
            "r2": {"timestamp": "2026-10-17T14:30:00+02:00"},
            "2026-10-17T12:30:00Z": {"uid": "abc"},
            "r4": {"timestamp": "2026-10-17T12:30:00.000Z"},
        }}));
        let (key, at) = latest_feeding(&snap, &clock()).expect("latest");
        assert_eq!(key, "r2");
        assert_eq!(at.to_rfc3339(), "2026-10-17T12:30:00+00:00");

        let view = derive(&snap, &clock(), &AggregatorConfig::default());
        assert_eq!(view.stats.last_fed_time, "Today, 12:30 PM");
    }

    #[test]
    fn last_fed_falls_back_to_stored_stat() {
        let view = derive_json(json!({"stats": {
            "last_fed_time": "2026-10-16T07:05:00Z",
            "last_fed_pet": "Rex (abc123)",
        }}));
        assert_eq!(view.stats.last_fed_time, "Yesterday, 07:05 AM");
        assert_eq!(view.stats.last_fed_pet, "Rex (abc123)");
    }

    #[test]
    fn uptime_freshness_when_online() {
        let view = derive_json(json!({"device_status": {
            "status": "online",
            "uptime": 100_000,
            "last_empty_time": 3_600_000,
        }}));
        assert_eq!(view.freshness.last_empty_time, "01:00:00 (device uptime)");
        assert_eq!(view.freshness.time_since_reset, "26 hours 46 mins");
        assert!(view.freshness.is_stale);
        assert_eq!(view.freshness.source, EmptyTimeSource::DeviceUptime);
    }

    #[test]
    fn uptime_freshness_offline_has_no_elapsed_label() {
        let view = derive_json(json!({"device_status": {
            "status": "offline",
            "uptime": 7_200,
            "last_empty_time": 3_600_000,
        }}));
        assert_eq!(view.freshness.time_since_reset, "N/A");
        assert!(!view.freshness.is_stale);
    }

    #[test]
    fn wall_clock_freshness() {
        let view = derive_json(json!({"last_empty_time": "2026-10-15T15:04:00Z"}));
        assert_eq!(view.freshness.last_empty_time, "Oct 15, 03:04 PM");
        assert_eq!(view.freshness.time_since_reset, "50 hours 56 mins");
        assert!(view.freshness.is_stale);

        let fresh = derive_json(json!({"last_empty_time": "2026-10-17T15:04:00Z"}));
        assert_eq!(fresh.freshness.last_empty_time, "Today, 03:04 PM");
        assert!(!fresh.freshness.is_stale);

        let bad = derive_json(json!({"last_empty_time": "soon"}));
        assert_eq!(bad.freshness.last_empty_time, "Invalid date");
        assert_eq!(bad.freshness.time_since_reset, "N/A");
        assert!(!bad.freshness.is_stale);
    }

    #[test]
    fn wifi_quality_bands() {
        let q = |v: f64| WifiQuality::from_signal(Some(&WifiSignal::Rssi(v)));
        assert_eq!(q(-45.0), WifiQuality::Excellent);
        assert_eq!(q(-50.0), WifiQuality::Excellent);
        assert_eq!(q(-60.0), WifiQuality::Strong);
        assert_eq!(q(-65.0), WifiQuality::Good);
        assert_eq!(q(-71.0), WifiQuality::Weak);
        assert_eq!(
            WifiQuality::from_signal(Some(&WifiSignal::Text("n/a".into()))),
            WifiQuality::Unknown
        );
    }

    #[test]
    fn recent_activities_newest_first_skipping_untimed() {
        let view = derive_json(json!({"recent_activities": {
            "a1": {"message": "Rex ate", "pet_name": "Rex", "timestamp": "2026-10-17T08:00:00Z"},
            "a2": {"message": "no time"},
            "a3": {"message": "Mochi ate", "timestamp": "2026-10-17T10:00:00Z"},
            "a4": {"message": "odd", "timestamp": "whenever"},
        }}));
        let keys: Vec<&str> = view.recent_activities.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["a3", "a1", "a4"]);
        assert_eq!(view.recent_activities[0].pet_name, "Unknown");
        assert_eq!(view.recent_activities[0].time, "Today, 10:00 AM");
        assert_eq!(view.recent_activities[2].time, "Invalid date");
    }
}
