//! Live re-derivation: consume a store subscription, recompute every
//! view-model per snapshot, and emit only when the result changed.
//!
//! SIGTERM/SIGINT stop the loop through `signal-hook` flags that the loop
//! polls between receives.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use serde_json::Value;
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::aggregator::{Aggregator, DeviceView};
use crate::core::errors::Result;
use crate::snapshot::{Clock, DeviceSnapshot};

/// Shutdown flag shared between signal handlers and the watch loop.
#[derive(Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Flag with SIGTERM and SIGINT registered. Registration failures are
    /// reported on stderr and leave the flag usable programmatically.
    pub fn with_os_signals() -> Self {
        let signal = Self::default();
        for (sig, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&signal.flag)) {
                eprintln!("[KIB-SIGNAL] failed to register {name}: {e}");
            }
        }
        signal
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    pub snapshots: u64,
    pub emitted: u64,
}

/// Run until `stop` is raised or the subscription closes.
///
/// `clock` is consulted once per snapshot so relative labels stay current;
/// `emit` sees each distinct view once, in arrival order.
pub fn run<C, E>(
    rx: &Receiver<Value>,
    aggregator: &Aggregator,
    mut clock: C,
    stop: &StopSignal,
    tick: Duration,
    mut emit: E,
) -> Result<WatchSummary>
where
    C: FnMut() -> Clock,
    E: FnMut(&DeviceView) -> Result<()>,
{
    let mut summary = WatchSummary::default();
    let mut last_fingerprint: Option<String> = None;

    while !stop.is_stopped() {
        let raw = match rx.recv_timeout(tick) {
            Ok(raw) => raw,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        summary.snapshots += 1;

        let view = aggregator.derive(&DeviceSnapshot::from_value(&raw), &clock());
        let fingerprint = view.fingerprint()?;
        if last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            continue;
        }
        emit(&view)?;
        summary.emitted += 1;
        last_fingerprint = Some(fingerprint);
    }
    Ok(summary)
}
