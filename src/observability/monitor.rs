//! Span tracking around matched filters and handlers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

/// Identifies one started span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SpanId(u64);

impl SpanId {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Pluggable latency hook invoked around every matched target.
///
/// `start` and `done` are called from request workers and must be cheap.
pub trait SpanTracker: Send + Sync {
    /// Begin a span named after the phase and pattern, e.g. `H_/f1/h1`.
    fn start(&self, name: &str) -> SpanId;

    /// Finish a span. Unknown IDs are ignored.
    fn done(&self, id: SpanId);

    /// Snapshot of everything tracked so far.
    fn state(&self) -> Value;
}

/// Aggregated timings for one span name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpanStats {
    /// Finished spans.
    pub count: u64,
    /// Spans started but not yet finished.
    pub pending: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Serialize)]
struct MonitorState<'a> {
    pending: usize,
    spans: &'a BTreeMap<String, SpanStats>,
}

/// In-process [`SpanTracker`] keeping per-name counters.
#[derive(Debug, Default)]
pub struct Monitor {
    next: AtomicU64,
    pending: Mutex<HashMap<SpanId, (String, Instant)>>,
    stats: Mutex<BTreeMap<String, SpanStats>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the per-name statistics.
    pub fn stats(&self) -> BTreeMap<String, SpanStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of spans started and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SpanTracker for Monitor {
    fn start(&self, name: &str) -> SpanId {
        let id = SpanId(self.next.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (name.to_string(), Instant::now()));
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .pending += 1;
        id
    }

    fn done(&self, id: SpanId) {
        let started = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let Some((name, started)) = started else {
            return;
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(name).or_default();
        entry.pending = entry.pending.saturating_sub(1);
        entry.count += 1;
        entry.total_ms += elapsed_ms;
        entry.avg_ms = entry.total_ms / entry.count as f64;
        if elapsed_ms > entry.max_ms {
            entry.max_ms = elapsed_ms;
        }
    }

    fn state(&self) -> Value {
        let pending = self.pending();
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_value(MonitorState {
            pending,
            spans: &stats,
        })
        .unwrap_or(Value::Null)
    }
}
