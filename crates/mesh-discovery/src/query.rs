// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `DiscoveryQuery` value object, its validation, and the filter/sort
//! predicates applied to a candidate set of agent records.

use mesh_error::{ErrorCode, MeshError};
use mesh_registry::AgentRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Field a [`DiscoveryQuery`] may sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Agent display name.
    Name,
    /// Agent version string.
    Version,
    /// Registration timestamp.
    RegisteredAt,
    /// Last-updated timestamp.
    LastUpdated,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Sort specification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Sort {
    /// Field to order by.
    pub field: SortField,
    /// Direction to order in.
    pub order: SortOrder,
}

/// A discovery query: domain/capability/version/name filters plus
/// sort/pagination/health-probe options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryQuery {
    /// Restrict to an exact domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Require every listed capability to be present (AND).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Restrict to an exact version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Case-insensitive substring match against the record's `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sort specification; unsorted (registry iteration order) if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    /// Maximum number of results to return, clamped to `maxResults`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of matching results to skip before applying `limit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Attach a live health probe to each returned record.
    #[serde(default)]
    pub include_health: bool,
}

impl DiscoveryQuery {
    /// Validate `limit`/`offset`/`sort` against the configured bounds.
    /// `limit ∈ [0, max_results]`; `offset ≥ 0` (always true for `usize`,
    /// checked here for symmetry and future-proofing against signed input).
    pub fn validate(&self, max_results: usize) -> Result<(), MeshError> {
        if let Some(limit) = self.limit {
            if limit > max_results {
                return Err(MeshError::new(
                    ErrorCode::DiscoveryInvalidQuery,
                    format!("limit {limit} exceeds maxResults {max_results}"),
                )
                .with_context("limit", limit)
                .with_context("max_results", max_results));
            }
        }
        Ok(())
    }

    /// Effective result cap: `limit` if set, else `max_results`.
    pub fn effective_limit(&self, max_results: usize) -> usize {
        self.limit.unwrap_or(max_results).min(max_results)
    }

    /// Effective offset: `offset` if set, else zero.
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Canonical JSON form used as the cache key: fields are serialized in a
    /// stable order because [`DiscoveryQuery`]'s field order never changes
    /// and `serde_json` preserves struct field order.
    pub fn cache_key(&self) -> Result<String, MeshError> {
        serde_json::to_string(self)
            .map_err(|e| MeshError::new(ErrorCode::DiscoveryInvalidQuery, format!("cache key: {e}")))
    }

    /// Returns `true` if `record` passes every filter in this query.
    pub fn matches(&self, record: &AgentRecord) -> bool {
        if let Some(domain) = &self.domain {
            if record.urn.domain() != domain {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if record.version != *version {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !record.name.to_ascii_lowercase().contains(&name.to_ascii_lowercase()) {
                return false;
            }
        }
        self.capabilities.iter().all(|cap| record.capabilities.contains_key(cap))
    }
}

/// Sort `records` in place according to `sort`, falling back to no-op when
/// `sort` is `None`. Timestamps compare chronologically; strings compare
/// case-insensitively. Ties keep their relative order (stable sort).
pub fn apply_sort(records: &mut [AgentRecord], sort: Option<&Sort>) {
    let Some(sort) = sort else { return };
    records.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::Name => a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()),
            SortField::Version => a.version.to_ascii_lowercase().cmp(&b.version.to_ascii_lowercase()),
            SortField::RegisteredAt => a.registered_at.cmp(&b.registered_at),
            SortField::LastUpdated => a.last_updated.cmp(&b.last_updated),
        };
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}
