//! Device snapshot aggregator: pure derivation of every view-model from one
//! snapshot.
//!
//! Each deriver recomputes from scratch; nothing is cached between snapshots.
//! Given the same snapshot, clock and configuration the output is identical,
//! which [`DeviceView::fingerprint`] makes cheap to check.

pub mod analytics;
pub mod dashboard;
pub mod notifications;
pub mod pets;

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::snapshot::time::WeekStart;
use crate::snapshot::{Clock, DeviceSnapshot};

pub use analytics::AnalyticsView;
pub use dashboard::{ChartPeriod, DashboardView};
pub use notifications::{NotificationFeed, NotificationFilter, NotificationKind};
pub use pets::{PetSortField, PetsView, SortDirection};

/// Knobs shared by the derivers.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub period: ChartPeriod,
    pub dashboard_week_start: WeekStart,
    pub analytics_week_start: WeekStart,
    pub battery_low_pct: f64,
    pub container_low_pct: f64,
    pub stale_after_hours: f64,
    pub default_names: Vec<String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AggregatorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            period: cfg.dashboard.period,
            dashboard_week_start: cfg.dashboard.week_start,
            analytics_week_start: cfg.analytics.week_start,
            battery_low_pct: cfg.alerts.battery_low_pct,
            container_low_pct: cfg.alerts.container_low_pct,
            stale_after_hours: cfg.alerts.stale_after_hours,
            default_names: cfg.pets.default_names.clone(),
        }
    }
}

/// Every view-model derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub dashboard: DashboardView,
    pub analytics: AnalyticsView,
    pub pets: PetsView,
    pub notifications: NotificationFeed,
}

impl DeviceView {
    /// SHA-256 over the canonical JSON encoding, hex encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Runs every deriver with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    #[must_use]
    pub const fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    #[must_use]
    pub fn dashboard(&self, snapshot: &DeviceSnapshot, clock: &Clock) -> DashboardView {
        dashboard::derive(snapshot, clock, &self.config)
    }

    #[must_use]
    pub fn analytics(&self, snapshot: &DeviceSnapshot, clock: &Clock) -> AnalyticsView {
        analytics::derive(snapshot, clock, &self.config)
    }

    #[must_use]
    pub fn pets(&self, snapshot: &DeviceSnapshot, clock: &Clock) -> PetsView {
        pets::derive(snapshot, clock, &self.config)
    }

    #[must_use]
    pub fn notifications(&self, snapshot: &DeviceSnapshot, clock: &Clock) -> NotificationFeed {
        notifications::derive(snapshot, clock, &self.config)
    }

    #[must_use]
    pub fn derive(&self, snapshot: &DeviceSnapshot, clock: &Clock) -> DeviceView {
        DeviceView {
            dashboard: self.dashboard(snapshot, clock),
            analytics: self.analytics(snapshot, clock),
            pets: self.pets(snapshot, clock),
            notifications: self.notifications(snapshot, clock),
        }
    }
}

/// Display-name resolution: registry first, then the last name seen on a
/// feeding record, then `"Unknown"`.
#[derive(Debug, Default)]
pub(crate) struct NameBook<'a> {
    registry: HashMap<&'a str, &'a str>,
    last_seen: HashMap<&'a str, &'a str>,
}

impl<'a> NameBook<'a> {
    pub(crate) fn new(snapshot: &'a DeviceSnapshot) -> Self {
        let registry = snapshot
            .pet_registry
            .iter()
            .filter(|(_, name)| !name.trim().is_empty())
            .map(|(uid, name)| (uid, name.as_str()))
            .collect();
        let mut last_seen = HashMap::new();
        for record in snapshot.feeding_history.values() {
            if let (Some(uid), Some(name)) = (record.uid.as_deref(), record.pet_name.as_deref())
                && !name.trim().is_empty()
            {
                last_seen.insert(uid, name);
            }
        }
        Self {
            registry,
            last_seen,
        }
    }

    pub(crate) fn name(&self, uid: &str) -> &'a str {
        self.registry
            .get(uid)
            .or_else(|| self.last_seen.get(uid))
            .copied()
            .unwrap_or("Unknown")
    }
}
