// SPDX-License-Identifier: MIT OR Apache-2.0
//! mesh-discovery
//!
//! Read-side query engine over [`mesh_registry::Registry`] with a bounded,
//! TTL'd result cache and an optional live health probe.

pub mod cache;
pub mod health;
pub mod query;

use cache::ResultCache;
use chrono::{DateTime, Utc};
use health::{HealthProbe, HealthProbeResult};
use mesh_error::MeshError;
use mesh_registry::{AgentRecord, Registry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

pub use query::{DiscoveryQuery, Sort, SortField, SortOrder};

/// A record annotated with its live health probe result, when requested.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnnotatedAgent {
    /// The underlying record.
    #[serde(flatten)]
    pub record: AgentRecord,
    /// Present only when the query set `includeHealth`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthProbeResult>,
}

/// The result of running a [`DiscoveryQuery`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Matching records, post-filter/sort/paginate.
    pub agents: Vec<AgentRecord>,
    /// Total matches before pagination was applied.
    pub total: usize,
    /// `min(limit, total - offset)`: the number of records actually returned.
    pub returned: usize,
    /// The query that produced this result, echoed back for traceability.
    pub query: DiscoveryQuery,
    /// When the query was executed.
    pub executed_at: DateTime<Utc>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// Configuration for a [`DiscoveryService`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Hard cap applied to any query's `limit`.
    pub max_results: usize,
    /// How long a cached result stays valid.
    pub cache_ttl: Duration,
    /// Per-call timeout for health probes.
    pub health_probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_results: 100,
            cache_ttl: Duration::from_secs(30),
            health_probe_timeout: Duration::from_millis(500),
        }
    }
}

/// Query engine combining the registry's gather step with filter, sort,
/// paginate, and optional health-probe stages, fronted by a TTL'd cache.
#[derive(Clone)]
pub struct DiscoveryService {
    registry: Registry,
    config: DiscoveryConfig,
    cache: ResultCache,
    health_probe: HealthProbe,
}

impl DiscoveryService {
    /// Build a discovery service over `registry`.
    pub fn new(registry: Registry, config: DiscoveryConfig) -> Self {
        let cache = ResultCache::new(config.cache_ttl);
        let health_probe = HealthProbe::new(config.health_probe_timeout);
        Self { registry, config, cache, health_probe }
    }

    /// Invalidate every cached result. Call this after a successful
    /// registration so the cache never serves results that predate it.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate_all().await;
    }

    /// Run `query` against the registry, honoring the cache.
    pub async fn discover(&self, query: DiscoveryQuery) -> Result<DiscoveryResult, MeshError> {
        query.validate(self.config.max_results)?;

        let cache_key = query.cache_key()?;
        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(target: "mesh.discovery", "cache hit");
            return Ok(cached);
        }
        debug!(target: "mesh.discovery", "cache miss");

        let start = Instant::now();

        let mut candidates = match &query.domain {
            Some(domain) => self.registry.list_by_domain(domain).await,
            None => self.registry.all().await,
        };
        candidates.retain(|record| query.matches(record));

        let total = candidates.len();
        query::apply_sort(&mut candidates, query.sort.as_ref());

        let offset = query.effective_offset();
        let limit = query.effective_limit(self.config.max_results);
        let page: Vec<AgentRecord> = candidates.into_iter().skip(offset).take(limit).collect();
        let returned = page.len();

        let result = DiscoveryResult {
            agents: page,
            total,
            returned,
            query: query.clone(),
            executed_at: Utc::now(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        };

        self.cache.put(cache_key, result.clone()).await;
        Ok(result)
    }

    /// Run `query` and additionally attach a live health probe to each
    /// returned record, regardless of `query.include_health` (the caller
    /// decides when to call this versus [`DiscoveryService::discover`]).
    pub async fn discover_with_health(
        &self,
        query: DiscoveryQuery,
    ) -> Result<(DiscoveryResult, Vec<AnnotatedAgent>), MeshError> {
        let result = self.discover(query).await?;
        let mut annotated = Vec::with_capacity(result.agents.len());
        for record in &result.agents {
            let health = self.health_probe.probe(record).await;
            annotated.push(AnnotatedAgent { record: record.clone(), health: Some(health) });
        }
        Ok((result, annotated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_registry::{CapabilityEntry, RegistryConfig};
    use mesh_urn::Urn;
    use std::collections::BTreeMap;

    async fn seeded_registry(dir: &std::path::Path) -> Registry {
        let registry = Registry::new(RegistryConfig {
            data_dir: dir.to_path_buf(),
            max_agents: 100,
            flush_interval: Duration::from_secs(3600),
        });
        registry.initialize().await.unwrap();

        for (domain, name, caps) in [
            ("acme", "widget-bot", vec!["summarize"]),
            ("acme", "gadget-bot", vec!["translate"]),
            ("finance", "risk-bot", vec!["summarize", "forecast"]),
        ] {
            let now = Utc::now();
            let mut capabilities = BTreeMap::new();
            for cap in caps {
                capabilities.insert(
                    cap.to_string(),
                    CapabilityEntry { kind: "tool".into(), description: "x".into(), version: None },
                );
            }
            registry
                .register(AgentRecord {
                    urn: Urn::new(domain, name, None).unwrap(),
                    name: name.to_string(),
                    version: "1.0.0".to_string(),
                    description: "desc".to_string(),
                    capabilities,
                    endpoints: BTreeMap::new(),
                    auth: None,
                    registered_at: now,
                    last_updated: now,
                })
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn discover_filters_by_domain() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let result = service
            .discover(DiscoveryQuery { domain: Some("acme".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.returned, 2);
    }

    #[tokio::test]
    async fn discover_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let result = service
            .discover(DiscoveryQuery { limit: Some(1), offset: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.returned, 1);
    }

    #[tokio::test]
    async fn second_identical_query_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let query = DiscoveryQuery { domain: Some("acme".into()), ..Default::default() };
        let first = service.discover(query.clone()).await.unwrap();
        let second = service.discover(query).await.unwrap();
        assert_eq!(first.executed_at, second.executed_at);
    }

    #[tokio::test]
    async fn invalidate_cache_forces_fresh_execution() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let query = DiscoveryQuery::default();
        let first = service.discover(query.clone()).await.unwrap();
        service.invalidate_cache().await;
        let second = service.discover(query).await.unwrap();
        assert!(second.executed_at >= first.executed_at);
    }

    #[tokio::test]
    async fn empty_domain_yields_empty_result_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let result = service
            .discover(DiscoveryQuery { domain: Some("nonexistent".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.total, 0);
        assert!(result.agents.is_empty());
    }

    #[tokio::test]
    async fn invalid_query_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let result = service.discover(DiscoveryQuery { limit: Some(1_000_000), ..Default::default() }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn discover_with_health_attaches_unknown_for_missing_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let service = DiscoveryService::new(seeded_registry(dir.path()).await, DiscoveryConfig::default());
        let (_result, annotated) = service
            .discover_with_health(DiscoveryQuery { domain: Some("acme".into()), ..Default::default() })
            .await
            .unwrap();
        assert!(annotated.iter().all(|a| a.health.as_ref().unwrap().status == "unknown"));
    }
}
