//! Device document store: path-addressed JSON tree with atomic batch writes
//! and push subscriptions.

#![allow(missing_docs)]

pub mod memory;
pub mod path;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod tree;

use std::collections::HashMap;

use crossbeam_channel::Receiver;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::{KibError, Result};
use crate::snapshot::DeviceSnapshot;

pub use memory::MemoryStore;
pub use path::StorePath;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Backend contract shared by every store implementation.
pub trait DeviceStore: Send + Sync {
    /// Current value at `path` (`Null` when absent).
    fn read(&self, path: &StorePath) -> Result<Value>;

    /// Apply every write in `batch` or none of them. Returns the new revision.
    fn update(&self, batch: &WriteBatch) -> Result<u64>;

    /// Single-path write.
    fn set(&self, path: &StorePath, value: Value) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.set(path.clone(), value);
        self.update(&batch)
    }

    /// Full snapshot of `path` now, then again after every write touching it.
    /// After the receiver is dropped the feed is released at the next write
    /// touching `path`, or when the store itself is dropped.
    fn subscribe(&self, path: &StorePath) -> Result<Receiver<Value>>;

    /// Monotonic write counter.
    fn revision(&self) -> Result<u64>;

    /// Human-readable backend name for logs and status output.
    fn backend_name(&self) -> &'static str;
}

/// Read `devices/{id}` and decode it leniently.
pub fn read_snapshot(store: &dyn DeviceStore, device_root: &StorePath) -> Result<DeviceSnapshot> {
    let raw = store.read(device_root)?;
    Ok(DeviceSnapshot::from_value(&raw))
}

/// Ordered set of path → value writes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteBatch {
    writes: Vec<(StorePath, Value)>,
    /// Position of each path in `writes`.
    #[serde(skip)]
    index: HashMap<StorePath, usize>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the write for `path`.
    pub fn set(&mut self, path: StorePath, value: Value) -> &mut Self {
        if let Some(&slot) = self.index.get(&path) {
            self.writes[slot].1 = value;
        } else {
            self.index.insert(path.clone(), self.writes.len());
            self.writes.push((path, value));
        }
        self
    }

    /// Queue a delete.
    pub fn remove(&mut self, path: StorePath) -> &mut Self {
        self.set(path, Value::Null)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StorePath, &Value)> {
        self.writes.iter().map(|(p, v)| (p, v))
    }

    #[must_use]
    pub fn paths(&self) -> Vec<&StorePath> {
        self.writes.iter().map(|(p, _)| p).collect()
    }

    /// Value queued for `path`, if any.
    #[must_use]
    pub fn get(&self, path: &StorePath) -> Option<&Value> {
        self.index.get(path).map(|&slot| &self.writes[slot].1)
    }

    /// A batch must be non-empty and no path may be an ancestor of another,
    /// otherwise the outcome would depend on write order.
    pub fn validate(&self) -> Result<()> {
        if self.writes.is_empty() {
            return Err(KibError::InvalidBatch {
                details: "batch contains no writes".to_string(),
            });
        }
        // Sorted by segments, a path's descendants directly follow it, so
        // only neighbours need comparing.
        let mut sorted = self.paths();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0].is_ancestor_of(pair[1]) {
                return Err(KibError::InvalidBatch {
                    details: format!("paths {} and {} overlap", pair[0], pair[1]),
                });
            }
        }
        Ok(())
    }

    /// Apply to `root` in insertion order. Callers validate first.
    pub(crate) fn apply_to(&self, root: &mut Value) {
        for (path, value) in &self.writes {
            tree::set_at(root, path, value.clone());
        }
    }

    /// True if any write lands on, above or below `path`.
    #[must_use]
    pub fn touches(&self, path: &StorePath) -> bool {
        self.writes.iter().any(|(p, _)| p.overlaps(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).expect("path")
    }

    #[test]
    fn set_replaces_existing_entry() {
        let mut batch = WriteBatch::new();
        batch.set(p("a/b"), json!(1)).set(p("a/b"), json!(2));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(&p("a/b")), Some(&json!(2)));
    }

    #[test]
    fn validate_rejects_empty_and_overlapping() {
        assert!(WriteBatch::new().validate().is_err());

        let mut overlapping = WriteBatch::new();
        overlapping.set(p("a"), json!({})).set(p("a/b"), json!(1));
        let err = overlapping.validate().expect_err("overlap");
        assert_eq!(err.code(), "KIB-2002");

        let mut siblings = WriteBatch::new();
        siblings.set(p("a/b"), json!(1)).set(p("a/c"), json!(2));
        assert!(siblings.validate().is_ok());
    }

    #[test]
    fn validate_finds_ancestor_inserted_after_many_siblings() {
        let mut batch = WriteBatch::new();
        for i in 0..500 {
            batch.set(p(&format!("h/r{i:04}/pet_name")), json!("Rex"));
        }
        batch.set(p("h/r0250a"), json!(0)).set(p("g"), json!(0));
        assert!(batch.validate().is_ok());

        batch.set(p("h/r0499"), json!({}));
        let err = batch.validate().expect_err("overlap");
        assert!(err.to_string().contains("h/r0499"), "{err}");

        assert_eq!(batch.len(), 503);
        assert_eq!(batch.get(&p("h/r0123/pet_name")), Some(&json!("Rex")));
        assert_eq!(batch.get(&p("h/r0123")), None);
    }

    #[test]
    fn apply_and_touches() {
        let mut batch = WriteBatch::new();
        batch.set(p("devices/x/portion_level"), json!(50));
        batch.remove(p("devices/x/stale_food_alert"));
        let mut tree = json!({"devices": {"x": {"stale_food_alert": "yes"}}});
        batch.apply_to(&mut tree);
        assert_eq!(tree, json!({"devices": {"x": {"portion_level": 50}}}));
        assert!(batch.touches(&p("devices/x")));
        assert!(!batch.touches(&p("devices/y")));
    }
}
