//! Injected per-stage timing collection.
//!
//! The engine reports how long each stage of a correlation took to whatever
//! collector the caller installs. The default collector discards everything.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Stages of one spectral correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Pad,
    Transform,
    Truncate,
    Multiply,
    Restore,
    Inverse,
    Accumulate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pad => "pad",
            Stage::Transform => "transform",
            Stage::Truncate => "truncate",
            Stage::Multiply => "multiply",
            Stage::Restore => "restore",
            Stage::Inverse => "inverse",
            Stage::Accumulate => "accumulate",
        };
        f.write_str(name)
    }
}

/// Sink for stage timings. Must tolerate concurrent calls from worker threads.
pub trait ConvTelemetry: Send + Sync {
    fn record(&self, stage: Stage, elapsed: Duration);

    /// Collectors that ignore timings return false so callers can skip the clock.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards all timings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl ConvTelemetry for NoopTelemetry {
    fn record(&self, _stage: Stage, _elapsed: Duration) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Shared no-op collector.
pub static NOOP_TELEMETRY: NoopTelemetry = NoopTelemetry;

/// Accumulated time and call count for one stage.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StageTotal {
    pub total: Duration,
    pub calls: u64,
}

/// Mutex-protected per-stage totals.
#[derive(Debug, Default)]
pub struct StageTimings {
    totals: Mutex<BTreeMap<Stage, StageTotal>>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> BTreeMap<Stage, StageTotal> {
        match self.totals.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Clear all totals.
    pub fn reset(&self) {
        match self.totals.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl ConvTelemetry for StageTimings {
    fn record(&self, stage: Stage, elapsed: Duration) {
        let mut guard = match self.totals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = guard.entry(stage).or_default();
        entry.total += elapsed;
        entry.calls += 1;
    }
}

/// Run `f` and report its duration under `stage` when the collector is enabled.
#[inline]
pub fn timed<T>(telemetry: &dyn ConvTelemetry, stage: Stage, f: impl FnOnce() -> T) -> T {
    if !telemetry.enabled() {
        return f();
    }
    let start = Instant::now();
    let out = f();
    telemetry.record(stage, start.elapsed());
    out
}
