//! Write-side operations: each user intent becomes one [`WriteBatch`]
//! submitted once, with the outcome recorded in the audit log.
//!
//! Failures surface as a single [`KibError`]; nothing is retried or undone.

#![allow(missing_docs)]

pub mod rename;
pub mod settings;

use serde_json::Value;

use crate::aggregator::notifications::{NotificationFeed, storage_key};
use crate::core::errors::{KibError, Result};
use crate::logger::{AuditEntry, AuditLog};
use crate::snapshot::DeviceSnapshot;
use crate::store::{DeviceStore, StorePath, WriteBatch, read_snapshot};

pub use rename::plan_rename;
pub use settings::{DeviceSettings, SettingsPatch};

/// Write operations for one device.
pub struct DeviceOps<'a> {
    store: &'a dyn DeviceStore,
    device_id: String,
    root: StorePath,
    audit: Option<&'a AuditLog>,
    default_names: Vec<String>,
}

impl<'a> DeviceOps<'a> {
    pub fn new(store: &'a dyn DeviceStore, device_id: &str) -> Result<Self> {
        Ok(Self {
            store,
            device_id: device_id.to_string(),
            root: StorePath::device(device_id)?,
            audit: None,
            default_names: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_audit(mut self, audit: &'a AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Names written by [`Self::init_default_names`].
    #[must_use]
    pub fn with_default_names(mut self, names: &[String]) -> Self {
        self.default_names = names.to_vec();
        self
    }

    #[must_use]
    pub fn root(&self) -> &StorePath {
        &self.root
    }

    pub fn snapshot(&self) -> Result<DeviceSnapshot> {
        read_snapshot(self.store, &self.root)
    }

    /// Submit `batch` as `op` and audit the outcome.
    pub fn submit(&self, op: &str, batch: &WriteBatch) -> Result<u64> {
        let outcome = self.store.update(batch);
        if let Some(audit) = self.audit {
            let entry = AuditEntry::new(op, &self.device_id, batch);
            match &outcome {
                Ok(_) => audit.record(&entry),
                Err(err) => audit.record(&entry.failed(err)),
            }
        }
        outcome
    }

    // ──────────────────── pets ────────────────────

    pub fn rename_pet(&self, uid: &str, new_name: &str) -> Result<u64> {
        let snapshot = self.snapshot()?;
        let batch = plan_rename(&snapshot, &self.root, uid, new_name)?;
        self.submit("rename_pet", &batch)
    }

    pub fn start_tag_registration(&self) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.set(self.root.child("tag_registration_mode")?, Value::Bool(true));
        self.submit("start_tag_registration", &batch)
    }

    /// Leave registration mode and forget the detected tag.
    pub fn stop_tag_registration(&self) -> Result<u64> {
        let mut batch = WriteBatch::new();
        self.stop_registration_writes(&mut batch)?;
        self.submit("stop_tag_registration", &batch)
    }

    /// Name the tag the feeder last detected and leave registration mode,
    /// all in one batch.
    pub fn register_tag(&self, name: &str) -> Result<u64> {
        let snapshot = self.snapshot()?;
        let Some(uid) = snapshot.detected_tag_uid() else {
            return Err(KibError::NotFound {
                details: "no tag has been detected; start tag registration and scan a tag"
                    .to_string(),
            });
        };
        let mut batch = plan_rename(&snapshot, &self.root, uid, name)?;
        self.stop_registration_writes(&mut batch)?;
        self.submit("register_tag", &batch)
    }

    fn stop_registration_writes(&self, batch: &mut WriteBatch) -> Result<()> {
        batch
            .set(self.root.child("tag_registration_mode")?, Value::Bool(false))
            .remove(self.root.child("last_detected_tag")?);
        Ok(())
    }

    // ──────────────────── default names ────────────────────

    pub fn add_default_name(&self, name: &str) -> Result<u64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KibError::invalid_input("name", "pet name must not be empty"));
        }
        let mut names = self.snapshot()?.default_pet_names;
        if names.iter().any(|n| n == name) {
            return Err(KibError::invalid_input(
                "name",
                format!("{name:?} is already in the list"),
            ));
        }
        names.push(name.to_string());
        self.write_names("add_default_name", &names)
    }

    pub fn remove_default_name(&self, name: &str) -> Result<u64> {
        let names = self.snapshot()?.default_pet_names;
        let kept: Vec<String> = names.iter().filter(|n| *n != name).cloned().collect();
        if kept.len() == names.len() {
            return Err(KibError::NotFound {
                details: format!("{name:?} is not in the default name list"),
            });
        }
        self.write_names("remove_default_name", &kept)
    }

    /// Seed the list with the configured defaults when the device has none.
    /// Returns `None` when nothing needed writing.
    pub fn init_default_names(&self) -> Result<Option<u64>> {
        if !self.snapshot()?.default_pet_names.is_empty() || self.default_names.is_empty() {
            return Ok(None);
        }
        self.write_names("init_default_names", &self.default_names)
            .map(Some)
    }

    fn write_names(&self, op: &str, names: &[String]) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.set(
            self.root.child("default_pet_names")?,
            Value::from(names.to_vec()),
        );
        self.submit(op, &batch)
    }

    // ──────────────────── settings ────────────────────

    pub fn save_settings(&self, settings: &DeviceSettings) -> Result<u64> {
        let batch = settings.to_batch(&self.root)?;
        self.submit("save_settings", &batch)
    }

    /// Ask the feeder to sleep now.
    pub fn send_sleep_command(&self) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.set(
            self.root.join("sleep_settings/user_request_sleep")?,
            Value::Bool(true),
        );
        self.submit("send_sleep_command", &batch)
    }

    /// Write default auto-wake settings when the device has none.
    pub fn ensure_sleep_settings(&self) -> Result<Option<u64>> {
        if self.snapshot()?.sleep_settings.is_some() {
            return Ok(None);
        }
        let defaults = DeviceSettings::default();
        let mut batch = WriteBatch::new();
        batch
            .set(
                self.root.join("sleep_settings/auto_wake_enabled")?,
                Value::Bool(defaults.auto_wake_enabled),
            )
            .set(
                self.root.join("sleep_settings/auto_wake_hours")?,
                Value::from(defaults.auto_wake_hours),
            );
        self.submit("ensure_sleep_settings", &batch).map(Some)
    }

    // ──────────────────── notifications ────────────────────

    pub fn mark_read(&self, id: &str) -> Result<u64> {
        if id.trim().is_empty() {
            return Err(KibError::invalid_input("id", "notification id must not be empty"));
        }
        let mut batch = WriteBatch::new();
        batch.set(self.read_status_path(id)?, Value::Bool(true));
        self.submit("mark_read", &batch)
    }

    /// Mark every unread item in `feed` read. `None` when all were read.
    pub fn mark_all_read(&self, feed: &NotificationFeed) -> Result<Option<u64>> {
        let unread = feed.unread_ids();
        if unread.is_empty() {
            return Ok(None);
        }
        let mut batch = WriteBatch::new();
        for id in unread {
            batch.set(self.read_status_path(id)?, Value::Bool(true));
        }
        self.submit("mark_all_read", &batch).map(Some)
    }

    fn read_status_path(&self, id: &str) -> Result<StorePath> {
        self.root
            .join("notifications/read_status")?
            .child(&storage_key(id))
    }
}
