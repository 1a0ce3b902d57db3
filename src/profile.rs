//! Operation latency collection, active only in profiling mode.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated timings for one operation label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub calls: u64,
    pub total: Duration,
}

/// Collects call counts and cumulative latency per public operation.
///
/// When profiling mode is off every method is a no-op, so the hot path
/// pays a single branch.
#[derive(Debug, Default)]
pub struct Profiler {
    enabled: bool,
    stats: Mutex<HashMap<&'static str, OpStats>>,
}

impl Profiler {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Marks the start of an operation. Returns `None` when profiling
    /// is off.
    pub(crate) fn start(&self) -> Option<Instant> {
        self.enabled.then(Instant::now)
    }

    /// Records one completed operation.
    pub(crate) fn record(&self, label: &'static str, started: Option<Instant>) {
        if let Some(started) = started {
            let mut stats = self.stats.lock();
            let entry = stats.entry(label).or_default();
            entry.calls += 1;
            entry.total += started.elapsed();
        }
    }

    /// Returns the collected stats, sorted by label.
    pub fn snapshot(&self) -> Vec<(&'static str, OpStats)> {
        let stats = self.stats.lock();
        let mut snapshot: Vec<_> = stats.iter().map(|(label, s)| (*label, *s)).collect();
        snapshot.sort_by_key(|(label, _)| *label);
        snapshot
    }
}
