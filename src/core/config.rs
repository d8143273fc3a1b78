//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregator::dashboard::ChartPeriod;
use crate::core::errors::{KibError, Result};
use crate::snapshot::time::WeekStart;
use crate::store::path::validate_segment;

/// Pet names offered before the owner has registered any of their own.
pub const DEFAULT_PET_NAMES: [&str; 50] = [
    "Muichi", "Tomo", "Yuki", "Kiro", "Suki", "Hana", "Aiko", "Kenta", "Rin", "Kai", "Nori",
    "Mika", "Sora", "Kenji", "Emi", "Yui", "Riko", "Toshi", "Nana", "Ren", "Kumi", "Hiro", "Mari",
    "Taku", "Saya", "Yuma", "Kiko", "Naoki", "Ami", "Rei", "Tomi", "Haru", "Mei", "Sho", "Airi",
    "Kazu", "Hanae", "Riku", "Chika", "Yoru", "Ayumi", "Suzu", "Kiyo", "Tomoha", "Shin", "Sena",
    "Kayo", "Risa", "Toma", "Yuri",
];

/// Full Kibbler configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub alerts: AlertConfig,
    pub dashboard: DashboardConfig,
    pub analytics: AnalyticsConfig,
    pub pets: PetsConfig,
    pub store: StoreConfig,
    pub paths: PathsConfig,
}

/// Which device tree the CLI operates on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
}

/// Alert thresholds used by the notification deriver and the freshness check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    pub battery_low_pct: f64,
    pub container_low_pct: f64,
    pub stale_after_hours: f64,
}

/// Dashboard chart defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub period: ChartPeriod,
    pub week_start: WeekStart,
}

/// Analytics week convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub week_start: WeekStart,
}

/// Default pet-name list used when the device has none stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PetsConfig {
    pub default_names: Vec<String>,
}

/// Local store backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_db: PathBuf,
    pub poll_interval_ms: u64,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub audit_log: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "kibbler_001".to_string(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            battery_low_pct: 30.0,
            container_low_pct: 20.0,
            stale_after_hours: 24.0,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            period: ChartPeriod::SevenDays,
            week_start: WeekStart::Monday,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            week_start: WeekStart::Sunday,
        }
    }
}

impl Default for PetsConfig {
    fn default() -> Self {
        Self {
            default_names: DEFAULT_PET_NAMES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_db: data_dir().join("store.sqlite3"),
            poll_interval_ms: 500,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir()
                .join(".config")
                .join("kibbler")
                .join("config.toml"),
            audit_log: data_dir().join("audit.jsonl"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[KIB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("kibbler")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| KibError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if path.is_some() {
            return Err(KibError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment or validating.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a keeps the value stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("KIBBLER_DEVICE_ID") {
            self.device.id = raw.trim().to_string();
        }

        set_parsed(&mut lookup, "KIBBLER_ALERTS_BATTERY_LOW_PCT", &mut self.alerts.battery_low_pct)?;
        set_parsed(
            &mut lookup,
            "KIBBLER_ALERTS_CONTAINER_LOW_PCT",
            &mut self.alerts.container_low_pct,
        )?;
        set_parsed(
            &mut lookup,
            "KIBBLER_ALERTS_STALE_AFTER_HOURS",
            &mut self.alerts.stale_after_hours,
        )?;

        set_parsed(&mut lookup, "KIBBLER_DASHBOARD_PERIOD", &mut self.dashboard.period)?;
        set_parsed(
            &mut lookup,
            "KIBBLER_DASHBOARD_WEEK_START",
            &mut self.dashboard.week_start,
        )?;
        set_parsed(
            &mut lookup,
            "KIBBLER_ANALYTICS_WEEK_START",
            &mut self.analytics.week_start,
        )?;

        if let Some(raw) = lookup("KIBBLER_STORE_SQLITE_DB") {
            self.store.sqlite_db = PathBuf::from(raw);
        }
        set_parsed(
            &mut lookup,
            "KIBBLER_STORE_POLL_INTERVAL_MS",
            &mut self.store.poll_interval_ms,
        )?;

        if let Some(raw) = lookup("KIBBLER_AUDIT_LOG") {
            self.paths.audit_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Trim default names and drop blanks and repeats, keeping first occurrence.
    fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.pets.default_names = self
            .pets
            .default_names
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        validate_segment(&self.device.id).map_err(|e| KibError::InvalidConfig {
            details: format!("device.id: {e}"),
        })?;

        for (name, val) in [
            ("alerts.battery_low_pct", self.alerts.battery_low_pct),
            ("alerts.container_low_pct", self.alerts.container_low_pct),
        ] {
            if !(0.0..=100.0).contains(&val) {
                return Err(KibError::InvalidConfig {
                    details: format!("{name} must be in [0, 100], got {val}"),
                });
            }
        }

        if !self.alerts.stale_after_hours.is_finite() || self.alerts.stale_after_hours <= 0.0 {
            return Err(KibError::InvalidConfig {
                details: format!(
                    "alerts.stale_after_hours must be > 0, got {}",
                    self.alerts.stale_after_hours
                ),
            });
        }

        if self.store.poll_interval_ms < 10 {
            return Err(KibError::InvalidConfig {
                details: format!(
                    "store.poll_interval_ms must be >= 10, got {}",
                    self.store.poll_interval_ms
                ),
            });
        }

        if self.pets.default_names.iter().any(|n| n.trim().is_empty()) {
            return Err(KibError::InvalidConfig {
                details: "pets.default_names must not contain blank names".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_parsed<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .trim()
            .parse::<T>()
            .map_err(|error| KibError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, KibError};
    use crate::aggregator::dashboard::ChartPeriod;
    use crate::snapshot::time::WeekStart;
    use std::collections::HashMap;
    use std::path::Path;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pets.default_names.len(), 50);
        assert_eq!(cfg.dashboard.week_start, WeekStart::Monday);
        assert_eq!(cfg.analytics.week_start, WeekStart::Sunday);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let cfg = Config::from_toml_str(
            r#"
            [device]
            id = "kibbler_042"

            [dashboard]
            period = "4weeks"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.device.id, "kibbler_042");
        assert_eq!(cfg.dashboard.period, ChartPeriod::FourWeeks);
        assert!((cfg.alerts.battery_low_pct - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn env_overrides_apply_and_parse() {
        let env = vars(&[
            ("KIBBLER_DEVICE_ID", "feeder_7"),
            ("KIBBLER_ALERTS_BATTERY_LOW_PCT", "25"),
            ("KIBBLER_DASHBOARD_PERIOD", "6months"),
            ("KIBBLER_ANALYTICS_WEEK_START", "monday"),
            ("KIBBLER_STORE_POLL_INTERVAL_MS", "250"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .expect("overrides");
        assert_eq!(cfg.device.id, "feeder_7");
        assert!((cfg.alerts.battery_low_pct - 25.0).abs() < f64::EPSILON);
        assert_eq!(cfg.dashboard.period, ChartPeriod::SixMonths);
        assert_eq!(cfg.analytics.week_start, WeekStart::Monday);
        assert_eq!(cfg.store.poll_interval_ms, 250);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let env = vars(&[("KIBBLER_ALERTS_STALE_AFTER_HOURS", "a day")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .expect_err("expected parse failure");
        assert!(matches!(err, KibError::ConfigParse { context: "env", .. }));
        assert!(err.to_string().contains("KIBBLER_ALERTS_STALE_AFTER_HOURS"));
    }

    #[test]
    fn device_id_with_reserved_characters_rejected() {
        let mut cfg = Config::default();
        cfg.device.id = "kib.bler".to_string();
        let err = cfg.validate().expect_err("expected invalid device id");
        assert!(err.to_string().contains("device.id"));
    }

    #[test]
    fn thresholds_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.alerts.container_low_pct = 120.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.alerts.stale_after_hours = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn normalize_trims_and_dedups_default_names() {
        let mut cfg = Config::default();
        cfg.pets.default_names = vec![
            " Rex ".to_string(),
            "Rex".to_string(),
            String::new(),
            "Mochi".to_string(),
        ];
        cfg.normalize();
        assert_eq!(cfg.pets.default_names, vec!["Rex", "Mochi"]);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/kibbler/config.toml")));
        assert!(matches!(result, Err(KibError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[alerts]\nbattery_low_pct = 35.0\n").expect("write");
        let cfg = Config::load(Some(&path)).expect("load");
        assert!((cfg.alerts.battery_low_pct - 35.0).abs() < f64::EPSILON);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_deterministic_and_sensitive() {
        let cfg = Config::default();
        let h1 = cfg.stable_hash().expect("hash");
        let h2 = cfg.stable_hash().expect("hash");
        assert_eq!(h1, h2);

        let mut changed = cfg;
        changed.alerts.battery_low_pct = 31.0;
        assert_ne!(h1, changed.stable_hash().expect("hash"));
    }
}
