//! Structured lifecycle records.
//!
//! Every pool decision worth explaining (which tier served an alloc, when a
//! refill went to the bulk provider, which remainders were donated or
//! abandoned, which deallocs were rejected) is captured as a
//! [`PoolLogRecord`]. Records live in a bounded ring owned by the pool state
//! and are drained by the caller, so logging never allocates through the
//! pool itself and never blocks on I/O inside the critical section.

use std::collections::VecDeque;

use serde::Serialize;

/// Severity of a lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl PoolLogLevel {
    /// Parse from string (case-insensitive). Unknown input maps to `Warn`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "all" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "error" | "err" => Self::Error,
            _ => Self::Warn,
        }
    }
}

/// One lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolLogRecord {
    /// Monotonic decision id, starting at 1.
    pub decision_id: u64,
    /// `binpool::<symbol>::<decision id in hex>`.
    pub trace_id: String,
    pub level: PoolLogLevel,
    /// API entry point (`alloc`, `dealloc`, `dealloc_all`).
    pub symbol: &'static str,
    /// Event kind (`free_list_hit`, `bulk_refill`, `unknown_pointer`, ...).
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Size class, `None` for the direct path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    pub details: String,
}

/// Bounded ring of lifecycle records.
#[derive(Debug)]
pub(crate) struct LifecycleLog {
    records: VecDeque<PoolLogRecord>,
    capacity: usize,
    min_level: PoolLogLevel,
    next_decision_id: u64,
}

/// Fields of a record before it is stamped with an id.
pub(crate) struct Event {
    pub level: PoolLogLevel,
    pub symbol: &'static str,
    pub event: &'static str,
    pub ptr: Option<usize>,
    pub size: Option<usize>,
    pub class: Option<usize>,
    pub outcome: &'static str,
}

impl LifecycleLog {
    pub(crate) fn new(capacity: usize, min_level: PoolLogLevel) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            min_level,
            next_decision_id: 1,
        }
    }

    pub(crate) fn enabled(&self, level: PoolLogLevel) -> bool {
        self.capacity > 0 && level >= self.min_level
    }

    /// Stamps and stores `event`, evicting the oldest record when full.
    /// `details` is only evaluated when the level passes the filter.
    pub(crate) fn record(&mut self, event: Event, details: impl FnOnce() -> String) {
        if !self.enabled(event.level) {
            return;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(PoolLogRecord {
            decision_id,
            trace_id: format!("binpool::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            ptr: event.ptr,
            size: event.size,
            class: event.class,
            outcome: event.outcome,
            details: details(),
        });
    }

    pub(crate) fn snapshot(&self) -> Vec<PoolLogRecord> {
        self.records.iter().cloned().collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<PoolLogRecord> {
        self.records.drain(..).collect()
    }
}

/// Renders records as JSON lines.
pub fn to_jsonl(records: &[PoolLogRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}
