// SPDX-License-Identifier: MIT OR Apache-2.0
//! `.well-known/agent-capabilities` response shapes (the agent capability
//! manifest and the flat capability list).

use chrono::{DateTime, Utc};
use mesh_registry::AgentRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LIST_API_VERSION: &str = "well-known.ossp-agi.io/v1";
const MANIFEST_API_VERSION: &str = "acm.ossp-agi.io/v1";
const GENERATOR: &str = "mesh-api";
const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `{apiVersion, kind, metadata, items}` shape returned by the domain listing
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityList {
    pub api_version: String,
    pub kind: String,
    pub metadata: CapabilityListMetadata,
    pub items: Vec<CapabilityManifest>,
}

/// Metadata block of a [`CapabilityList`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityListMetadata {
    pub domain: Option<String>,
    pub count: usize,
    pub generated_at: DateTime<Utc>,
}

/// The Agent Capability Manifest (ACM): `{apiVersion, kind, metadata, spec}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: ManifestSpec,
}

/// Metadata block of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub urn: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub generator: String,
    pub generator_version: String,
}

/// Spec block of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    pub capabilities: Value,
    pub endpoints: Value,
    pub auth: Option<Value>,
    pub health: ManifestHealth,
}

/// Static (non-probed) health block embedded in the ACM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestHealth {
    pub status: String,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Build a [`CapabilityManifest`] from a registered agent.
pub fn to_manifest(record: &AgentRecord) -> CapabilityManifest {
    CapabilityManifest {
        api_version: MANIFEST_API_VERSION.to_string(),
        kind: "AgentCapabilityManifest".to_string(),
        metadata: ManifestMetadata {
            urn: record.urn.as_canonical(),
            name: record.name.clone(),
            version: record.version.clone(),
            description: record.description.clone(),
            created_at: record.registered_at,
            generator: GENERATOR.to_string(),
            generator_version: GENERATOR_VERSION.to_string(),
        },
        spec: ManifestSpec {
            capabilities: serde_json::to_value(&record.capabilities).unwrap_or(Value::Null),
            endpoints: serde_json::to_value(&record.endpoints).unwrap_or(Value::Null),
            auth: record.auth.clone(),
            health: ManifestHealth { status: "unknown".to_string(), last_checked: None },
        },
    }
}

/// Build a [`CapabilityList`] for `domain` (or every domain, if `None`) from
/// already-filtered `records`.
pub fn to_list(domain: Option<&str>, records: &[AgentRecord]) -> CapabilityList {
    CapabilityList {
        api_version: LIST_API_VERSION.to_string(),
        kind: "AgentCapabilityList".to_string(),
        metadata: CapabilityListMetadata {
            domain: domain.map(str::to_string),
            count: records.len(),
            generated_at: Utc::now(),
        },
        items: records.iter().map(to_manifest).collect(),
    }
}
