// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live health probing of a record's `endpoints.health` URL.

use chrono::{DateTime, Utc};
use mesh_registry::AgentRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of probing one agent's health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthProbeResult {
    /// `"healthy"`, `"unhealthy"`, or `"unknown"` (no health endpoint).
    pub status: String,
    /// When the probe was performed.
    pub last_checked: DateTime<Utc>,
    /// Round-trip time in milliseconds, if the probe completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    /// Present when `status` is `"unknown"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Present when `status` is `"unhealthy"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probes an agent's `endpoints.health` URL with a short timeout.
#[derive(Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthProbe {
    /// Build a prober with the given per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }

    /// Probe `record`'s health endpoint, if it declares one.
    pub async fn probe(&self, record: &AgentRecord) -> HealthProbeResult {
        let Some(url) = record.endpoints.get("health") else {
            return HealthProbeResult {
                status: "unknown".to_string(),
                last_checked: Utc::now(),
                response_time: None,
                reason: Some("no health endpoint declared".to_string()),
                error: None,
            };
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.client.get(url).send()).await;
        let last_checked = Utc::now();

        match outcome {
            Ok(Ok(response)) if response.status().is_success() => HealthProbeResult {
                status: "healthy".to_string(),
                last_checked,
                response_time: Some(start.elapsed().as_millis() as u64),
                reason: None,
                error: None,
            },
            Ok(Ok(response)) => HealthProbeResult {
                status: "unhealthy".to_string(),
                last_checked,
                response_time: Some(start.elapsed().as_millis() as u64),
                reason: None,
                error: Some(format!("unexpected status {}", response.status())),
            },
            Ok(Err(err)) => HealthProbeResult {
                status: "unhealthy".to_string(),
                last_checked,
                response_time: Some(start.elapsed().as_millis() as u64),
                reason: None,
                error: Some(err.to_string()),
            },
            Err(_) => HealthProbeResult {
                status: "unhealthy".to_string(),
                last_checked,
                response_time: Some(start.elapsed().as_millis() as u64),
                reason: None,
                error: Some("health probe timed out".to_string()),
            },
        }
    }
}
