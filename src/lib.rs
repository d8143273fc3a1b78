#![forbid(unsafe_code)]

//! Kibbler dashboard core: view-model derivation and write operations for
//! the Kibbler pet feeder.
//!
//! Three layers:
//! 1. **Snapshot**: lenient decoding of the raw `/devices/{id}` document tree
//! 2. **Aggregator**: pure derivation of dashboard, analytics, pet and
//!    notification view-models from one snapshot and an injected clock
//! 3. **Store + ops**: path-addressed document stores and the batch writes
//!    behind every user intent (rename, settings, read receipts, ...)
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use kibbler_core::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use kibbler_core::aggregator::dashboard::{ChartPeriod, derive_with_period};
//! use kibbler_core::store::{MemoryStore, StorePath};
//! ```

pub mod prelude;

pub mod aggregator;
pub mod core;
pub mod demo;
pub mod logger;
pub mod ops;
pub mod snapshot;
pub mod store;
#[cfg(feature = "watch")]
pub mod watch;
