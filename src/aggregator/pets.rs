//! Pet registry stats: per-uid visit counts, last visit, inactivity and the
//! name pools offered when naming a tag.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{AggregatorConfig, NameBook};
use crate::snapshot::model::TimeValue;
use crate::snapshot::time::{Clock, round_half_up, short_datetime};
use crate::snapshot::{DeviceSnapshot, OrderedMap};

/// Hours since the last recorded feed, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveHours {
    Hours(u64),
    Unknown,
}

impl InactiveHours {
    /// Sort key: unknown sorts as 0.
    #[must_use]
    pub const fn as_sort_key(self) -> u64 {
        match self {
            Self::Hours(h) => h,
            Self::Unknown => 0,
        }
    }
}

impl fmt::Display for InactiveHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hours(h) => write!(f, "{h}"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

impl Serialize for InactiveHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Hours(h) => serializer.serialize_u64(*h),
            Self::Unknown => serializer.serialize_str("Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PetStats {
    pub uid: String,
    pub name: String,
    pub registered: bool,
    pub visit_count: u64,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub last_visit_str: String,
    pub inactive_hours: InactiveHours,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PetsView {
    pub pet_stats: OrderedMap<PetStats>,
    pub all_names: Vec<String>,
    pub assigned_names: Vec<String>,
    pub unassigned_names: Vec<String>,
    pub registration_mode: bool,
    pub detected_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PetSortField {
    Name,
    Visits,
    Inactive,
}

impl FromStr for PetSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "visits" => Ok(Self::Visits),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!(
                "unknown sort field {other:?} (expected name|visits|inactive)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[must_use]
pub fn derive(snapshot: &DeviceSnapshot, clock: &Clock, config: &AggregatorConfig) -> PetsView {
    let names = NameBook::new(snapshot);

    let mut uids: Vec<(&str, bool)> = snapshot.pet_registry.keys().map(|uid| (uid, true)).collect();
    for uid in snapshot
        .feeding_history
        .values()
        .filter_map(|r| r.uid.as_deref())
        .filter(|uid| !uid.is_empty())
    {
        if !uids.iter().any(|(seen, _)| *seen == uid) {
            uids.push((uid, false));
        }
    }

    let pet_stats = uids
        .into_iter()
        .map(|(uid, registered)| {
            let stats = pet_stats(snapshot, clock, &names, uid, registered);
            (uid.to_string(), stats)
        })
        .collect();

    let assigned_names: Vec<String> = snapshot.pet_registry.values().cloned().collect();
    let defaults = if snapshot.default_pet_names.is_empty() {
        &config.default_names
    } else {
        &snapshot.default_pet_names
    };
    let all_names: Vec<String> = defaults
        .iter()
        .chain(assigned_names.iter())
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let unassigned_names = all_names
        .iter()
        .filter(|n| !assigned_names.iter().any(|a| a.trim() == n.as_str()))
        .cloned()
        .collect();

    PetsView {
        pet_stats,
        all_names,
        assigned_names,
        unassigned_names,
        registration_mode: snapshot.tag_registration_mode.unwrap_or(false),
        detected_tag: snapshot.detected_tag_uid().map(ToString::to_string),
    }
}

fn pet_stats(
    snapshot: &DeviceSnapshot,
    clock: &Clock,
    names: &NameBook<'_>,
    uid: &str,
    registered: bool,
) -> PetStats {
    let mut visit_count = 0_u64;
    let mut last_visit: Option<DateTime<Utc>> = None;
    for record in snapshot.feeding_history.values() {
        if record.uid.as_deref() != Some(uid) {
            continue;
        }
        visit_count += 1;
        if let Some(t) = record.timestamp.as_deref().and_then(|t| clock.parse(t))
            && last_visit.is_none_or(|best| t > best)
        {
            last_visit = Some(t);
        }
    }

    PetStats {
        uid: uid.to_string(),
        name: names.name(uid).to_string(),
        registered,
        visit_count,
        last_visit_at: last_visit,
        last_visit_str: last_visit
            .map_or_else(|| "Never".to_string(), |t| short_datetime(clock.local(t))),
        inactive_hours: inactive_hours(snapshot.last_fed_times.get(uid), clock),
    }
}

fn inactive_hours(value: Option<&TimeValue>, clock: &Clock) -> InactiveHours {
    let millis = match value {
        Some(TimeValue::Millis(ms)) if ms.is_finite() => Some(*ms),
        #[allow(clippy::cast_precision_loss)]
        Some(TimeValue::Text(raw)) => clock.parse(raw).map(|t| t.timestamp_millis() as f64),
        _ => None,
    };
    millis.map_or(InactiveHours::Unknown, |ms| {
        #[allow(clippy::cast_precision_loss)]
        let hours = round_half_up((clock.now_millis() as f64 - ms) / 3_600_000.0);
        InactiveHours::Hours(u64::try_from(hours.max(0)).unwrap_or(0))
    })
}

/// Filter by case-insensitive name substring, then stable-sort.
#[must_use]
pub fn sort_pets<'a>(
    view: &'a PetsView,
    field: PetSortField,
    direction: SortDirection,
    search: Option<&str>,
) -> Vec<&'a PetStats> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let mut rows: Vec<&PetStats> = view
        .pet_stats
        .values()
        .filter(|p| {
            needle
                .as_deref()
                .is_none_or(|n| p.name.to_lowercase().contains(n))
        })
        .collect();
    rows.sort_by(|a, b| {
        let ord = match field {
            PetSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            PetSortField::Visits => a.visit_count.cmp(&b.visit_count),
            PetSortField::Inactive => a
                .inactive_hours
                .as_sort_key()
                .cmp(&b.inactive_hours.as_sort_key()),
        };
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    rows
}

impl PetsView {
    /// Whether `name` is already bound to some uid other than `except_uid`.
    #[must_use]
    pub fn name_taken(&self, name: &str, except_uid: Option<&str>) -> bool {
        self.pet_stats.values().any(|p| {
            p.registered && p.name == name && Some(p.uid.as_str()) != except_uid
        })
    }
}
