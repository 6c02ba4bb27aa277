// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire and storage types for the registry.

use chrono::{DateTime, Utc};
use mesh_urn::Urn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single capability offered by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CapabilityEntry {
    /// Capability kind, e.g. `"tool"` or `"skill"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description of what the capability does.
    pub description: String,
    /// Optional capability-specific version, independent of the agent's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A registered agent.
///
/// `urn` is the primary key; `registered_at` is stamped once at
/// registration and never changes. `last_updated` starts equal to
/// `registered_at` and would move forward if update support were added —
/// the core has none, per spec.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// The agent's URN identity; the registry's primary key.
    pub urn: Urn,
    /// Display name, required and non-empty.
    pub name: String,
    /// Semantic version string, required and non-empty.
    pub version: String,
    /// One-line description of the agent, required and non-empty.
    pub description: String,
    /// Capabilities keyed by name; names are unique within a record.
    pub capabilities: BTreeMap<String, CapabilityEntry>,
    /// Named endpoints (URL or path); arbitrary keys. `api` and `health`
    /// are conventional but not enforced.
    pub endpoints: BTreeMap<String, String>,
    /// Opaque auth configuration for the owning agent, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
    /// When this record was first written.
    pub registered_at: DateTime<Utc>,
    /// Last-modified timestamp; equals `registered_at` until update support
    /// exists.
    pub last_updated: DateTime<Utc>,
}

impl AgentRecord {
    /// Returns `true` if every required string field is non-empty and every
    /// capability name maps to a capability with non-empty `kind`/`description`.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty()
            && !self.version.is_empty()
            && !self.description.is_empty()
            && self
                .capabilities
                .values()
                .all(|c| !c.kind.is_empty() && !c.description.is_empty())
    }
}

/// Aggregate registry statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Number of records in the primary index.
    pub total_agents: usize,
    /// Number of distinct domains across all registered agents.
    pub total_domains: usize,
    /// Number of distinct capability names across all registered agents.
    pub total_capabilities: usize,
}

/// Registry health summary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    /// `"healthy"` or `"degraded"`.
    pub status: String,
    /// Current record count.
    pub agent_count: usize,
    /// When the durable index was last flushed, if ever.
    pub last_flushed: Option<DateTime<Utc>>,
}
