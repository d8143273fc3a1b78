//! Analytics deriver: visit grids, peak hours, new tags and week-over-week
//! comparisons.

#![allow(missing_docs)]

use std::collections::HashSet;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use super::{AggregatorConfig, NameBook};
use crate::snapshot::time::{Clock, iso_week_key, month_day, round_half_up, short_datetime};
use crate::snapshot::{DeviceSnapshot, OrderedMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitCount {
    pub count: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub label: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
    pub count: u64,
    pub percent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastVisit {
    pub name: String,
    pub time: String,
    /// Epoch seconds; 0 when the pet has no parseable visit.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTag {
    pub name: String,
    pub first_seen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequentVisitor {
    pub uid: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InactivePet {
    pub uid: String,
    pub name: String,
    pub hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsView {
    pub unique_pets: OrderedMap<String>,
    /// date → uid → visits.
    pub visits_per_pet_per_day: OrderedMap<OrderedMap<VisitCount>>,
    pub visits_per_pet_per_week: OrderedMap<VisitCount>,
    /// 24 slots indexed by UTC hour.
    pub hourly_counts: Vec<u64>,
    pub peak_hours: Vec<u32>,
    pub time_of_day: Vec<TimeRange>,
    pub last_visit_times: OrderedMap<LastVisit>,
    pub new_tags_this_week: OrderedMap<NewTag>,
    pub most_frequent_visitor: Option<FrequentVisitor>,
    pub most_inactive_pet: Option<InactivePet>,
    pub this_week_visits: u64,
    pub last_week_visits: u64,
    pub visit_rate_change: i64,
}

const RANGES: [(&str, u32, u32); 4] = [
    ("12AM - 6AM", 0, 6),
    ("6AM - 12PM", 6, 12),
    ("12PM - 6PM", 12, 18),
    ("6PM - 12AM", 18, 24),
];

/// One feeding record reduced to what analytics needs.
struct Visit<'a> {
    uid: Option<&'a str>,
    date: Option<String>,
    at: Option<DateTime<Utc>>,
}

#[must_use]
pub fn derive(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> AnalyticsView {
    let names = NameBook::new(snapshot);
    let visits: Vec<Visit<'_>> = snapshot
        .feeding_history
        .values()
        .map(|record| {
            let at = record.timestamp.as_deref().and_then(|t| clock.parse(t));
            let date = record
                .date
                .clone()
                .filter(|d| !d.trim().is_empty())
                .or_else(|| at.map(|t| clock.local_date(t).format("%Y-%m-%d").to_string()));
            Visit {
                uid: record.uid.as_deref().filter(|u| !u.is_empty()),
                date,
                at,
            }
        })
        .collect();

    let mut unique_pets = OrderedMap::new();
    for uid in visits.iter().filter_map(|v| v.uid) {
        if !unique_pets.contains_key(uid) {
            unique_pets.insert(uid, names.name(uid).to_string());
        }
    }

    let (hourly_counts, peak_hours) = peak_hours(&visits);
    let (this_week_visits, last_week_visits, visit_rate_change) =
        visit_rate(&visits, clock, config);
    let last_visit_times = last_visit_times(&visits, &unique_pets, clock);

    AnalyticsView {
        visits_per_pet_per_day: per_day(&visits, &names),
        visits_per_pet_per_week: per_week(&visits, &names, clock),
        time_of_day: time_of_day(&visits),
        new_tags_this_week: new_tags(&visits, &names, clock, config),
        most_frequent_visitor: most_frequent(&visits, &unique_pets),
        most_inactive_pet: most_inactive(&last_visit_times, clock),
        hourly_counts,
        peak_hours,
        last_visit_times,
        unique_pets,
        this_week_visits,
        last_week_visits,
        visit_rate_change,
    }
}

fn per_day(visits: &[Visit<'_>], names: &NameBook<'_>) -> OrderedMap<OrderedMap<VisitCount>> {
    let mut grid: OrderedMap<OrderedMap<VisitCount>> = OrderedMap::new();
    for visit in visits {
        let (Some(uid), Some(date)) = (visit.uid, visit.date.as_deref()) else {
            continue;
        };
        let day = grid.entry_or_insert_with(date, OrderedMap::new);
        day.entry_or_insert_with(uid, || VisitCount {
            count: 0,
            name: names.name(uid).to_string(),
        })
        .count += 1;
    }
    grid
}

/// Visits in the current ISO week (week-year and number both match).
fn per_week(visits: &[Visit<'_>], names: &NameBook<'_>, clock: &Clock) -> OrderedMap<VisitCount> {
    let current = iso_week_key(clock.today());
    let mut out: OrderedMap<VisitCount> = OrderedMap::new();
    for visit in visits {
        let (Some(uid), Some(at)) = (visit.uid, visit.at) else {
            continue;
        };
        if iso_week_key(clock.local_date(at)) != current {
            continue;
        }
        out.entry_or_insert_with(uid, || VisitCount {
            count: 0,
            name: names.name(uid).to_string(),
        })
        .count += 1;
    }
    out
}

/// Every hour achieving the maximum; empty when nothing is timestamped.
fn peak_hours(visits: &[Visit<'_>]) -> (Vec<u64>, Vec<u32>) {
    let mut hourly = vec![0_u64; 24];
    for at in visits.iter().filter_map(|v| v.at) {
        hourly[at.hour() as usize] += 1;
    }
    let max = hourly.iter().copied().max().unwrap_or(0);
    let peaks = if max == 0 {
        Vec::new()
    } else {
        (0_u32..24)
            .filter(|h| hourly[*h as usize] == max)
            .collect()
    };
    (hourly, peaks)
}

/// Buckets by UTC hour, the same hours as `hourly_counts`.
fn time_of_day(visits: &[Visit<'_>]) -> Vec<TimeRange> {
    let hours: Vec<u32> = visits.iter().filter_map(|v| v.at).map(|at| at.hour()).collect();
    let total = hours.len() as u64;
    RANGES
        .iter()
        .map(|(label, start, end)| {
            let count = hours.iter().filter(|h| (*start..*end).contains(*h)).count() as u64;
            #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
            let percent = if total == 0 {
                0
            } else {
                round_half_up(count as f64 / total as f64 * 100.0).max(0) as u64
            };
            TimeRange {
                label,
                start_hour: *start,
                end_hour: *end,
                count,
                percent,
            }
        })
        .collect()
}

fn last_visit_times(
    visits: &[Visit<'_>],
    unique_pets: &OrderedMap<String>,
    clock: &Clock,
) -> OrderedMap<LastVisit> {
    unique_pets
        .iter()
        .map(|(uid, name)| {
            let latest = visits
                .iter()
                .filter(|v| v.uid == Some(uid))
                .filter_map(|v| v.at)
                .max();
            let entry = match latest {
                Some(t) => LastVisit {
                    name: name.clone(),
                    time: short_datetime(clock.local(t)),
                    timestamp: t.timestamp(),
                },
                None => LastVisit {
                    name: name.clone(),
                    time: "Never".to_string(),
                    timestamp: 0,
                },
            };
            (uid.to_string(), entry)
        })
        .collect()
}

/// Tags first seen since the analytics week start with no earlier record.
fn new_tags(
    visits: &[Visit<'_>],
    names: &NameBook<'_>,
    clock: &Clock,
    config: &AggregatorConfig,
) -> OrderedMap<NewTag> {
    let week_start = clock.week_start(config.analytics_week_start);
    let seen_before: HashSet<&str> = visits
        .iter()
        .filter(|v| v.at.is_some_and(|t| t < week_start))
        .filter_map(|v| v.uid)
        .collect();

    let mut earliest: OrderedMap<DateTime<Utc>> = OrderedMap::new();
    for visit in visits {
        let (Some(uid), Some(at)) = (visit.uid, visit.at) else {
            continue;
        };
        if at < week_start || seen_before.contains(uid) {
            continue;
        }
        let slot = earliest.entry_or_insert_with(uid, || at);
        if at < *slot {
            *slot = at;
        }
    }

    earliest
        .iter()
        .map(|(uid, at)| {
            (
                uid.to_string(),
                NewTag {
                    name: names.name(uid).to_string(),
                    first_seen: month_day(clock.local(*at)),
                },
            )
        })
        .collect()
}

fn most_frequent(visits: &[Visit<'_>], unique_pets: &OrderedMap<String>) -> Option<FrequentVisitor> {
    let mut best: Option<FrequentVisitor> = None;
    for (uid, name) in unique_pets.iter() {
        let count = visits.iter().filter(|v| v.uid == Some(uid)).count() as u64;
        if best.as_ref().is_none_or(|b| count > b.count) {
            best = Some(FrequentVisitor {
                uid: uid.to_string(),
                name: name.clone(),
                count,
            });
        }
    }
    best
}

fn most_inactive(last_visits: &OrderedMap<LastVisit>, clock: &Clock) -> Option<InactivePet> {
    let now_ms = clock.now_millis();
    let mut best: Option<InactivePet> = None;
    for (uid, visit) in last_visits.iter() {
        #[allow(clippy::cast_precision_loss)]
        let hours = round_half_up((now_ms - visit.timestamp * 1000) as f64 / 3_600_000.0);
        if best.as_ref().is_none_or(|b| hours > b.hours) {
            best = Some(InactivePet {
                uid: uid.to_string(),
                name: visit.name.clone(),
                hours,
            });
        }
    }
    best
}

/// `(this week, last week, % change)` against the analytics week start.
fn visit_rate(visits: &[Visit<'_>], clock: &Clock, config: &AggregatorConfig) -> (u64, u64, i64) {
    let week_start = clock.week_start(config.analytics_week_start);
    let last_start = week_start - Duration::days(7);
    let mut this_week = 0_u64;
    let mut last_week = 0_u64;
    for at in visits.iter().filter_map(|v| v.at) {
        if at >= week_start {
            this_week += 1;
        } else if at >= last_start {
            last_week += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let change = if last_week == 0 {
        0
    } else {
        round_half_up((this_week as f64 - last_week as f64) / last_week as f64 * 100.0)
    };
    (this_week, last_week, change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Saturday; the Sunday week started 2026-10-11, the ISO week on 2026-10-12.
    fn clock() -> Clock {
        Clock::from_rfc3339("2026-10-17T18:00:00+00:00").expect("clock")
    }

    fn analytics(tree: serde_json::Value) -> AnalyticsView {
        derive(
            &DeviceSnapshot::from_value(&tree),
            &clock(),
            &AggregatorConfig::default(),
        )
    }

    fn feed(uid: &str, name: &str, ts: &str) -> serde_json::Value {
        json!({"uid": uid, "pet_name": name, "timestamp": ts, "date": &ts[..10]})
    }

    #[test]
    fn empty_history_has_no_visitor_and_no_peaks() {
        let view = analytics(json!({"pet_registry": {"abc123": "Rex"}}));
        assert!(view.most_frequent_visitor.is_none());
        assert!(view.most_inactive_pet.is_none());
        assert!(view.peak_hours.is_empty());
        assert_eq!(view.hourly_counts, vec![0; 24]);
        assert_eq!(view.visit_rate_change, 0);
        assert!(view.time_of_day.iter().all(|r| r.percent == 0));
    }

    #[test]
    fn multiple_peak_hours_are_reported() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-17T08:10:00Z"),
            "r2": feed("a", "Rex", "2026-10-16T08:50:00Z"),
            "r3": feed("b", "Mochi", "2026-10-15T14:00:00Z"),
            "r4": feed("b", "Mochi", "2026-10-14T14:30:00Z"),
            "r5": feed("b", "Mochi", "2026-10-14T03:30:00Z"),
        }}));
        assert_eq!(view.peak_hours, vec![8, 14]);
        assert_eq!(view.hourly_counts[3], 1);
    }

    #[test]
    fn per_day_grid_and_weekly_totals() {
        let view = analytics(json!({
            "pet_registry": {"a": "Rex"},
            "feeding_history": {
                "r1": feed("a", "Old name", "2026-10-17T08:00:00Z"),
                "r2": feed("a", "Old name", "2026-10-17T12:00:00Z"),
                "r3": feed("b", "Mochi", "2026-10-17T09:00:00Z"),
                "r4": feed("b", "Mochi", "2026-10-11T09:00:00Z"),
            },
        }));
        let today = view.visits_per_pet_per_day.get("2026-10-17").expect("day");
        assert_eq!(today.get("a").map(|v| v.count), Some(2));
        assert_eq!(today.get("a").map(|v| v.name.as_str()), Some("Rex"));
        assert_eq!(today.get("b").map(|v| v.count), Some(1));

        // 2026-10-11 is a Sunday and belongs to ISO week 41.
        let weekly_total: u64 = view.visits_per_pet_per_week.values().map(|v| v.count).sum();
        assert_eq!(weekly_total, 3);
    }

    #[test]
    fn new_tags_use_sunday_week_start() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("old", "Rex", "2026-10-05T08:00:00Z"),
            "r2": feed("old", "Rex", "2026-10-16T08:00:00Z"),
            "r3": feed("new", "Mochi", "2026-10-16T09:00:00Z"),
            "r4": feed("new", "Mochi", "2026-10-11T01:00:00Z"),
        }}));
        assert_eq!(view.new_tags_this_week.len(), 1);
        let tag = view.new_tags_this_week.get("new").expect("new tag");
        assert_eq!(tag.first_seen, "Oct 11");
        assert_eq!(tag.name, "Mochi");
    }

    #[test]
    fn visit_rate_change_rounds_half_up() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-12T08:00:00Z"),
            "r2": feed("a", "Rex", "2026-10-13T08:00:00Z"),
            "r3": feed("a", "Rex", "2026-10-14T08:00:00Z"),
            "r4": feed("a", "Rex", "2026-10-05T08:00:00Z"),
            "r5": feed("a", "Rex", "2026-10-06T08:00:00Z"),
            "r6": feed("a", "Rex", "2026-09-01T08:00:00Z"),
        }}));
        assert_eq!(view.this_week_visits, 3);
        assert_eq!(view.last_week_visits, 2);
        assert_eq!(view.visit_rate_change, 50);
    }

    #[test]
    fn most_frequent_tie_keeps_first_uid() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("b", "Mochi", "2026-10-17T08:00:00Z"),
            "r2": feed("a", "Rex", "2026-10-17T09:00:00Z"),
            "r3": feed("a", "Rex", "2026-10-17T10:00:00Z"),
            "r4": feed("b", "Mochi", "2026-10-17T11:00:00Z"),
        }}));
        let top = view.most_frequent_visitor.expect("visitor");
        assert_eq!(top.uid, "b");
        assert_eq!(top.count, 2);
    }

    #[test]
    fn most_inactive_uses_latest_visit_and_epoch_for_never() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-17T06:00:00Z"),
            "r2": feed("b", "Mochi", "2026-10-16T18:00:00Z"),
            "r3": feed("b", "Mochi", "2026-10-15T18:00:00Z"),
        }}));
        let pet = view.most_inactive_pet.expect("inactive");
        assert_eq!(pet.uid, "b");
        assert_eq!(pet.hours, 24);

        let never = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-17T06:00:00Z"),
            "r2": {"uid": "c", "pet_name": "Ghost"},
        }}));
        let pet = never.most_inactive_pet.expect("inactive");
        assert_eq!(pet.uid, "c");
        assert!(pet.hours > 400_000);
        assert_eq!(
            never.last_visit_times.get("c").map(|v| v.time.as_str()),
            Some("Never")
        );
    }

    #[test]
    fn time_of_day_percentages() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-17T01:00:00Z"),
            "r2": feed("a", "Rex", "2026-10-17T07:00:00Z"),
            "r3": feed("a", "Rex", "2026-10-17T08:00:00Z"),
        }}));
        let percents: Vec<u64> = view.time_of_day.iter().map(|r| r.percent).collect();
        assert_eq!(percents, vec![33, 67, 0, 0]);
    }

    #[test]
    fn time_of_day_uses_the_histogram_hours() {
        // UTC-7: 05:30Z is 10:30 PM the previous local evening.
        let west = Clock::from_rfc3339("2026-10-17T11:00:00-07:00").expect("clock");
        let view = derive(
            &DeviceSnapshot::from_value(&json!({"feeding_history": {
                "r1": feed("a", "Rex", "2026-10-17T05:30:00Z"),
                "r2": feed("a", "Rex", "2026-10-17T13:00:00Z"),
            }})),
            &west,
            &AggregatorConfig::default(),
        );
        assert_eq!(view.hourly_counts[5], 1);
        let counts: Vec<u64> = view.time_of_day.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 0, 1, 0]);
    }

    #[test]
    fn last_visit_time_is_short_date_and_clock() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("a", "Rex", "2026-10-15T15:04:00Z"),
            "r2": feed("a", "Rex", "2026-10-17T09:05:00Z"),
        }}));
        let last = view.last_visit_times.get("a").expect("last visit");
        assert_eq!(last.time, "Oct 17, 9:05 AM");
        assert_eq!(last.timestamp, 1_792_227_900);
    }

    #[test]
    fn most_inactive_tie_keeps_first_uid() {
        let view = analytics(json!({"feeding_history": {
            "r1": feed("b", "Mochi", "2026-10-16T18:00:00Z"),
            "r2": feed("a", "Rex", "2026-10-16T18:00:00Z"),
            "r3": feed("c", "Yuki", "2026-10-17T12:00:00Z"),
        }}));
        let pet = view.most_inactive_pet.expect("inactive");
        assert_eq!(pet.uid, "b");
        assert_eq!(pet.hours, 24);
    }
}
