//! In-process store guarded by a `parking_lot` lock.

#![allow(missing_docs)]

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::path::StorePath;
use super::{DeviceStore, WriteBatch, tree};
use crate::core::errors::{KibError, Result};

struct Subscriber {
    path: StorePath,
    tx: Sender<Value>,
}

struct State {
    tree: Value,
    revision: u64,
    subscribers: Vec<Subscriber>,
    reject_writes: Option<String>,
}

/// Volatile store used by tests, the demo command and embedders.
pub struct MemoryStore {
    state: RwLock<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tree(Value::Object(Map::new()))
    }

    #[must_use]
    pub fn with_tree(tree: Value) -> Self {
        Self {
            state: RwLock::new(State {
                tree,
                revision: 0,
                subscribers: Vec::new(),
                reject_writes: None,
            }),
        }
    }

    /// Make every later write fail with `reason` until cleared with `None`.
    pub fn reject_writes(&self, reason: Option<&str>) {
        self.state.write().reject_writes = reason.map(ToString::to_string);
    }

    /// Copy of the whole document.
    #[must_use]
    pub fn dump(&self) -> Value {
        self.state.read().tree.clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }
}

impl DeviceStore for MemoryStore {
    fn read(&self, path: &StorePath) -> Result<Value> {
        Ok(tree::get_at(&self.state.read().tree, path))
    }

    fn update(&self, batch: &WriteBatch) -> Result<u64> {
        batch.validate()?;
        let mut state = self.state.write();
        if let Some(reason) = &state.reject_writes {
            return Err(KibError::WriteRejected {
                path: batch
                    .paths()
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                reason: reason.clone(),
            });
        }

        let mut next = state.tree.clone();
        batch.apply_to(&mut next);
        state.tree = next;
        state.revision += 1;

        let State {
            tree: doc,
            subscribers,
            ..
        } = &mut *state;
        // Dropped receivers are pruned the next time their path is written.
        subscribers.retain(|sub| {
            !batch.touches(&sub.path) || sub.tx.send(tree::get_at(doc, &sub.path)).is_ok()
        });
        Ok(state.revision)
    }

    fn subscribe(&self, path: &StorePath) -> Result<Receiver<Value>> {
        let (tx, rx) = unbounded();
        let mut state = self.state.write();
        tx.send(tree::get_at(&state.tree, path))
            .map_err(|_| KibError::ChannelClosed {
                component: "memory store subscriber",
            })?;
        state.subscribers.push(Subscriber {
            path: path.clone(),
            tx,
        });
        Ok(rx)
    }

    fn revision(&self) -> Result<u64> {
        Ok(self.state.read().revision)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
