//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use kibbler_core::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{KibError, Result};

// Snapshot
pub use crate::snapshot::time::WeekStart;
pub use crate::snapshot::{Clock, DeviceSnapshot};

// Aggregator
pub use crate::aggregator::{
    Aggregator, AggregatorConfig, AnalyticsView, ChartPeriod, DashboardView, DeviceView,
    NotificationFeed, NotificationFilter, NotificationKind, PetSortField, PetsView, SortDirection,
};

// Store
#[cfg(feature = "sqlite")]
pub use crate::store::SqliteStore;
pub use crate::store::{DeviceStore, MemoryStore, StorePath, WriteBatch, read_snapshot};

// Operations and audit
pub use crate::logger::{AuditConfig, AuditLog};
pub use crate::ops::{DeviceOps, DeviceSettings, SettingsPatch};
