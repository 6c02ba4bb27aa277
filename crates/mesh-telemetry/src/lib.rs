// SPDX-License-Identifier: MIT OR Apache-2.0
//! mesh-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Structured logging, correlation-scoped tracing, and metrics collection
//! for the agent mesh control plane.
//!
//! Every request entering C9 is assigned a [`CorrelationId`] and a
//! [`RequestId`]; both ride along as `tracing::Span` fields so every log
//! line emitted underneath inherits them without explicit threading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

pub mod ids;
pub mod tracer;

pub use ids::{CorrelationId, RequestId};
pub use tracer::{TraceStatus, Tracer, TracerMetrics};

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Six-level severity scale: `trace < debug < info < warn < error < fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Debugging detail, off by default in production.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable but noteworthy condition.
    Warn,
    /// Operation failed.
    Error,
    /// Unrecoverable condition; process or subsystem cannot continue.
    Fatal,
}

impl LogLevel {
    /// Lowercase name, used as the `levelName` field on emitted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

// ---------------------------------------------------------------------------
// LogRecord
// ---------------------------------------------------------------------------

/// A single structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique identifier for this record.
    pub id: Uuid,
    /// Emission timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Severity level.
    pub level: LogLevel,
    /// Lowercase level name, redundant with `level` but kept as its own
    /// field so consumers can filter on it without decoding the enum.
    pub level_name: String,
    /// Human-readable message.
    pub message: String,
    /// Correlation ID spanning a logical user action.
    pub correlation_id: Option<Uuid>,
    /// Request ID for a single request within that action.
    pub request_id: Option<Uuid>,
    /// Originating component (e.g. `"registry"`, `"mcp"`).
    pub component: Option<String>,
    /// Operation name within the component.
    pub operation: Option<String>,
    /// Duration in milliseconds, when the record completes a timed span.
    pub duration_ms: Option<u64>,
    /// Arbitrary structured context, flattened alongside the fixed fields.
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Start building a record at the given level.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            level_name: level.as_str().to_string(),
            level,
            message: message.into(),
            correlation_id: None,
            request_id: None,
            component: None,
            operation: None,
            duration_ms: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach correlation/request scope.
    pub fn with_scope(mut self, correlation_id: CorrelationId, request_id: RequestId) -> Self {
        self.correlation_id = Some(correlation_id.into_inner());
        self.request_id = Some(request_id.into_inner());
        self
    }

    /// Attach component/operation naming.
    pub fn with_operation(mut self, component: impl Into<String>, operation: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self.operation = Some(operation.into());
        self
    }

    /// Attach a duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach a metadata key-value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    /// Emit this record through `tracing` at the matching level.
    ///
    /// Sink delivery (formatting, writing) happens inside the installed
    /// `tracing` subscriber and is non-blocking from the caller's
    /// perspective, satisfying the "must not stall request paths" rule.
    pub fn emit(&self) {
        let metadata = self
            .metadata
            .is_empty()
            .then(String::new)
            .unwrap_or_else(|| serde_json::to_string(&self.metadata).unwrap_or_default());

        match self.level {
            LogLevel::Trace => trace!(
                target: "mesh",
                correlation_id = ?self.correlation_id,
                request_id = ?self.request_id,
                component = ?self.component,
                operation = ?self.operation,
                duration_ms = ?self.duration_ms,
                metadata = %metadata,
                "{}", self.message
            ),
            LogLevel::Debug => debug!(
                target: "mesh",
                correlation_id = ?self.correlation_id,
                request_id = ?self.request_id,
                component = ?self.component,
                operation = ?self.operation,
                duration_ms = ?self.duration_ms,
                metadata = %metadata,
                "{}", self.message
            ),
            LogLevel::Info => info!(
                target: "mesh",
                correlation_id = ?self.correlation_id,
                request_id = ?self.request_id,
                component = ?self.component,
                operation = ?self.operation,
                duration_ms = ?self.duration_ms,
                metadata = %metadata,
                "{}", self.message
            ),
            LogLevel::Warn => warn!(
                target: "mesh",
                correlation_id = ?self.correlation_id,
                request_id = ?self.request_id,
                component = ?self.component,
                operation = ?self.operation,
                duration_ms = ?self.duration_ms,
                metadata = %metadata,
                "{}", self.message
            ),
            LogLevel::Error | LogLevel::Fatal => error!(
                target: "mesh",
                fatal = self.level == LogLevel::Fatal,
                correlation_id = ?self.correlation_id,
                request_id = ?self.request_id,
                component = ?self.component,
                operation = ?self.operation,
                duration_ms = ?self.duration_ms,
                metadata = %metadata,
                "{}", self.message
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationMetrics / MetricsSummary
// ---------------------------------------------------------------------------

/// Metrics captured for a single completed operation (an API request, an A2A
/// call, an MCP tool invocation, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationMetrics {
    /// Component that performed the operation.
    pub component: String,
    /// Operation name.
    pub operation: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the operation ended in an error.
    pub errored: bool,
}

/// Aggregated statistics across multiple recorded operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of operations recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Error rate (errored / total).
    pub error_rate: f64,
    /// Per-component operation counts (deterministic ordering).
    pub component_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            error_rate: 0.0,
            component_counts: BTreeMap::new(),
        }
    }
}

/// Compute a percentile value from a **sorted** slice via linear
/// interpolation between ranks.
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

/// Thread-safe collector for operation metrics, backing the `/api/v1/stats`
/// endpoint.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<OperationMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a completed operation's metrics.
    pub fn record(&self, metrics: OperationMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Number of operations recorded so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("metrics lock poisoned").len()
    }

    /// Whether the collector has no recorded operations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded operations.
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let errored: u64 = data.iter().filter(|r| r.errored).count() as u64;
        let error_rate = errored as f64 / count as f64;

        let mut component_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *component_counts.entry(r.component.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            error_rate,
            component_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        self.inner.lock().expect("metrics lock poisoned").clear();
    }

    /// Time a synchronous operation and record its metrics automatically.
    pub fn time<T>(&self, component: &str, operation: &str, f: impl FnOnce() -> Result<T, ()>) -> Result<T, ()> {
        let start = Instant::now();
        let result = f();
        self.record(OperationMetrics {
            component: component.to_string(),
            operation: operation.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            errored: result.is_err(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(component: &str, duration: u64, errored: bool) -> OperationMetrics {
        OperationMetrics {
            component: component.to_string(),
            operation: "op".to_string(),
            duration_ms: duration,
            errored,
        }
    }

    #[test]
    fn collector_new_is_empty() {
        let c = MetricsCollector::new();
        assert!(c.is_empty());
    }

    #[test]
    fn summary_computes_mean_and_percentiles() {
        let c = MetricsCollector::new();
        for d in [10, 20, 30, 40, 50] {
            c.record(sample("registry", d, false));
        }
        let s = c.summary();
        assert_eq!(s.count, 5);
        assert!((s.mean_duration_ms - 30.0).abs() < f64::EPSILON);
        assert!((s.p50_duration_ms - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_error_rate() {
        let c = MetricsCollector::new();
        c.record(sample("mcp", 10, true));
        c.record(sample("mcp", 20, false));
        let s = c.summary();
        assert!((s.error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_component_counts_deterministic_order() {
        let c = MetricsCollector::new();
        c.record(sample("zeta", 1, false));
        c.record(sample("alpha", 1, false));
        let s = c.summary();
        let json = serde_json::to_string(&s.component_counts).unwrap();
        assert!(json.find("alpha").unwrap() < json.find("zeta").unwrap());
    }

    #[test]
    fn percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn log_record_builder_roundtrips() {
        let record = LogRecord::new(LogLevel::Info, "registered agent")
            .with_scope(CorrelationId::new(), RequestId::new())
            .with_operation("registry", "register")
            .with_duration(12)
            .with_metadata("urn", "urn:agent:ai:ml-agent@1.0.0");
        assert_eq!(record.level_name, "info");
        assert!(record.correlation_id.is_some());
        assert_eq!(record.component.as_deref(), Some("registry"));
        assert_eq!(record.duration_ms, Some(12));
    }

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }
}
