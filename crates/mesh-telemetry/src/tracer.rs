// SPDX-License-Identifier: MIT OR Apache-2.0
//! Active-trace bookkeeping for C3's `startTrace`/`completeTrace` contract.

use crate::LogRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Outcome of a completed trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// The traced operation succeeded.
    Success,
    /// The traced operation failed.
    Failure,
}

struct ActiveTrace {
    operation: String,
    context: BTreeMap<String, serde_json::Value>,
    started_at: Instant,
}

/// Running aggregate metrics across completed traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TracerMetrics {
    /// Traces started.
    pub total_started: u64,
    /// Traces completed (success or failure).
    pub total_completed: u64,
    /// Moving average of completion duration, in milliseconds.
    pub mean_duration_ms: f64,
}

struct Inner {
    active: HashMap<Uuid, ActiveTrace>,
    metrics: TracerMetrics,
}

/// Maintains in-flight spans keyed by an internal trace id, and emits a
/// completion [`LogRecord`] when a trace finishes.
///
/// Constructible per-subsystem rather than as a process-wide singleton, so
/// tests can inject an instance and assert on recorded traces.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    /// Create a fresh tracer with no active or completed traces.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                active: HashMap::new(),
                metrics: TracerMetrics::default(),
            })),
        }
    }

    /// Allocate a new trace entry with a start timestamp; returns an opaque
    /// trace id.
    pub fn start_trace(
        &self,
        operation: impl Into<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().expect("tracer lock poisoned");
        inner.active.insert(
            id,
            ActiveTrace {
                operation: operation.into(),
                context,
                started_at: Instant::now(),
            },
        );
        inner.metrics.total_started += 1;
        id
    }

    /// Stamp the end time, compute duration, remove the trace from the
    /// active set, update the moving-average metric, and emit a completion
    /// log record. Returns `None` if `id` is unknown (already completed or
    /// never started).
    pub fn complete_trace(
        &self,
        id: Uuid,
        status: TraceStatus,
        result: Option<serde_json::Value>,
    ) -> Option<LogRecord> {
        let mut inner = self.inner.lock().expect("tracer lock poisoned");
        let trace = inner.active.remove(&id)?;
        let duration_ms = trace.started_at.elapsed().as_millis() as u64;

        let completed_before = inner.metrics.total_completed;
        let new_mean = (inner.metrics.mean_duration_ms * completed_before as f64
            + duration_ms as f64)
            / (completed_before + 1) as f64;
        inner.metrics.total_completed += 1;
        inner.metrics.mean_duration_ms = new_mean;
        drop(inner);

        let mut record = LogRecord::new(
            crate::LogLevel::Info,
            format!("trace completed: {}", trace.operation),
        )
        .with_operation("tracer", trace.operation)
        .with_duration(duration_ms)
        .with_metadata("status", status)
        .with_metadata("trace_id", id.to_string());

        if let Some(result) = result {
            record = record.with_metadata("result", result);
        }
        for (k, v) in trace.context {
            record = record.with_metadata(k, v);
        }

        info!(target: "mesh.tracer", trace_id = %id, duration_ms, status = ?status, "trace completed");
        Some(record)
    }

    /// All currently active (not-yet-completed) trace ids.
    pub fn active_trace_ids(&self) -> Vec<Uuid> {
        self.inner
            .lock()
            .expect("tracer lock poisoned")
            .active
            .keys()
            .copied()
            .collect()
    }

    /// Snapshot of aggregate trace metrics.
    pub fn metrics(&self) -> TracerMetrics {
        self.inner.lock().expect("tracer lock poisoned").metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_complete_removes_from_active_set() {
        let tracer = Tracer::new();
        let id = tracer.start_trace("register", BTreeMap::new());
        assert_eq!(tracer.active_trace_ids(), vec![id]);

        let record = tracer.complete_trace(id, TraceStatus::Success, None).unwrap();
        assert!(tracer.active_trace_ids().is_empty());
        assert_eq!(record.component.as_deref(), Some("tracer"));
    }

    #[test]
    fn completing_unknown_trace_returns_none() {
        let tracer = Tracer::new();
        assert!(tracer.complete_trace(Uuid::new_v4(), TraceStatus::Failure, None).is_none());
    }

    #[test]
    fn metrics_track_started_and_completed_counts() {
        let tracer = Tracer::new();
        let a = tracer.start_trace("a", BTreeMap::new());
        let _b = tracer.start_trace("b", BTreeMap::new());
        tracer.complete_trace(a, TraceStatus::Success, None);

        let metrics = tracer.metrics();
        assert_eq!(metrics.total_started, 2);
        assert_eq!(metrics.total_completed, 1);
    }

    #[test]
    fn multiple_active_traces_are_independent() {
        let tracer = Tracer::new();
        let a = tracer.start_trace("a", BTreeMap::new());
        let b = tracer.start_trace("b", BTreeMap::new());
        assert_eq!(tracer.active_trace_ids().len(), 2);
        tracer.complete_trace(a, TraceStatus::Success, None);
        assert_eq!(tracer.active_trace_ids(), vec![b]);
    }
}
