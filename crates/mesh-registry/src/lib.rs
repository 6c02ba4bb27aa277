// SPDX-License-Identifier: MIT OR Apache-2.0
//! mesh-registry
//!
//! Durable, URN-keyed authoritative store of agent records with O(1) URN
//! lookup and O(1) domain/capability fan-out.

pub mod store;
pub mod types;

use chrono::Utc;
use mesh_error::{ErrorCode, MeshError};
use mesh_resilience::CancellationToken;
use mesh_urn::Urn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use store::{IndexFile, RegistryStore};
use tokio::sync::RwLock;
use tracing::{info, warn};
pub use types::{AgentRecord, CapabilityEntry, RegistryHealth, RegistryStats};

/// Configuration for a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory the durable index and per-agent files live under.
    pub data_dir: std::path::PathBuf,
    /// Hard cap on the number of agents the registry will hold in memory.
    pub max_agents: usize,
    /// How often the index is flushed to disk in the background.
    pub flush_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: std::path::PathBuf::from("./mesh-data/registry"),
            max_agents: 10_000,
            flush_interval: Duration::from_secs(5),
        }
    }
}

struct Indexes {
    primary: HashMap<Urn, AgentRecord>,
    by_domain: HashMap<String, HashSet<Urn>>,
    by_capability: HashMap<String, HashSet<Urn>>,
    last_flushed: Option<chrono::DateTime<Utc>>,
}

impl Indexes {
    fn new() -> Self {
        Self {
            primary: HashMap::new(),
            by_domain: HashMap::new(),
            by_capability: HashMap::new(),
            last_flushed: None,
        }
    }

    fn insert(&mut self, record: AgentRecord) {
        self.by_domain
            .entry(record.urn.domain().to_string())
            .or_default()
            .insert(record.urn.clone());
        for capability in record.capabilities.keys() {
            self.by_capability
                .entry(capability.clone())
                .or_default()
                .insert(record.urn.clone());
        }
        self.primary.insert(record.urn.clone(), record);
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_agents: self.primary.len(),
            total_domains: self.by_domain.len(),
            total_capabilities: self.by_capability.len(),
        }
    }
}

/// Durable, in-memory-indexed registry of [`AgentRecord`]s.
///
/// Cloning shares the same underlying state; use one `Registry` per
/// process and clone it into whichever components need access.
#[derive(Clone)]
pub struct Registry {
    config: Arc<RegistryConfig>,
    store: RegistryStore,
    indexes: Arc<RwLock<Indexes>>,
    cancel: CancellationToken,
}

impl Registry {
    /// Construct a registry without touching the filesystem or starting the
    /// flush timer; call [`Registry::initialize`] before use.
    pub fn new(config: RegistryConfig) -> Self {
        let store = RegistryStore::new(config.data_dir.clone());
        Self {
            config: Arc::new(config),
            store,
            indexes: Arc::new(RwLock::new(Indexes::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Ensure the data directory exists, load the durable index (rebuilding
    /// indexes from the per-agent files it references), and start the
    /// periodic flush timer.
    ///
    /// Index corruption is surfaced as [`ErrorCode::RegistryCorrupt`] rather
    /// than silently discarded.
    pub async fn initialize(&self) -> Result<(), MeshError> {
        self.store.ensure_dirs().await?;
        let index = self.store.load_index().await?;

        let mut indexes = self.indexes.write().await;
        for filename in index.entries.values() {
            let record = self.store.read_agent(filename).await?;
            indexes.insert(record);
        }
        indexes.last_flushed = index.last_saved;
        drop(indexes);

        self.spawn_flush_loop();
        info!(target: "mesh.registry", "registry initialized");
        Ok(())
    }

    fn spawn_flush_loop(&self) {
        let registry = self.clone();
        let interval = self.config.flush_interval;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = registry.flush_index().await {
                            warn!(target: "mesh.registry", error = %err, "periodic index flush failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    async fn flush_index(&self) -> Result<(), MeshError> {
        let indexes = self.indexes.read().await;
        let mut entries = std::collections::BTreeMap::new();
        for urn in indexes.primary.keys() {
            entries.insert(urn.as_canonical(), format!("{}.json", RegistryStore::sanitize_filename(urn)));
        }
        let index = IndexFile { entries, stats: indexes.stats(), last_saved: Some(Utc::now()) };
        drop(indexes);
        self.store.write_index(&index).await?;
        self.indexes.write().await.last_flushed = index.last_saved;
        Ok(())
    }

    /// Register a new agent record.
    ///
    /// Ordering: validate -> capacity check -> durable write -> index
    /// insert. A durable-write failure leaves the record unindexed.
    pub async fn register(&self, mut record: AgentRecord) -> Result<AgentRecord, MeshError> {
        if !record.is_well_formed() {
            return Err(MeshError::new(
                ErrorCode::ValidationFailed,
                "agent record is missing required fields",
            ));
        }

        let now = Utc::now();
        record.registered_at = now;
        record.last_updated = now;

        {
            let indexes = self.indexes.read().await;
            if indexes.primary.contains_key(&record.urn) {
                return Err(MeshError::new(
                    ErrorCode::ResolutionDuplicate,
                    format!("agent already registered: {}", record.urn),
                )
                .with_context("urn", record.urn.as_canonical()));
            }
            if indexes.primary.len() >= self.config.max_agents {
                return Err(MeshError::new(
                    ErrorCode::RegistryCapacityExceeded,
                    "registry is at capacity",
                )
                .with_context("max_agents", self.config.max_agents));
            }
        }

        self.store.write_agent(&record).await?;

        let mut indexes = self.indexes.write().await;
        // Re-check under the write lock: another writer may have registered
        // the same URN between our read-lock check and taking the write lock.
        if indexes.primary.contains_key(&record.urn) {
            return Err(MeshError::new(
                ErrorCode::ResolutionDuplicate,
                format!("agent already registered: {}", record.urn),
            ));
        }
        indexes.insert(record.clone());
        drop(indexes);

        info!(target: "mesh.registry", urn = %record.urn, "agent registered");
        Ok(record)
    }

    /// Look up a record by URN. Returns `Ok(None)` for an unknown (but
    /// validly-formed) URN rather than an error.
    pub async fn get(&self, urn: &Urn) -> Option<AgentRecord> {
        self.indexes.read().await.primary.get(urn).cloned()
    }

    /// All records registered under `domain`. Empty for an unknown domain.
    pub async fn list_by_domain(&self, domain: &str) -> Vec<AgentRecord> {
        let indexes = self.indexes.read().await;
        let Some(urns) = indexes.by_domain.get(domain) else { return Vec::new() };
        urns.iter().filter_map(|u| indexes.primary.get(u)).cloned().collect()
    }

    /// All records exposing capability `name`. Empty for an unknown capability.
    pub async fn search_by_capability(&self, name: &str) -> Vec<AgentRecord> {
        let indexes = self.indexes.read().await;
        let Some(urns) = indexes.by_capability.get(name) else { return Vec::new() };
        urns.iter().filter_map(|u| indexes.primary.get(u)).cloned().collect()
    }

    /// Every registered record, in arbitrary order. Used by discovery's
    /// domain-agnostic gather path.
    pub async fn all(&self) -> Vec<AgentRecord> {
        self.indexes.read().await.primary.values().cloned().collect()
    }

    /// Every domain currently represented in the registry.
    pub async fn known_domains(&self) -> Vec<String> {
        self.indexes.read().await.by_domain.keys().cloned().collect()
    }

    /// Current aggregate statistics.
    pub async fn stats(&self) -> RegistryStats {
        self.indexes.read().await.stats()
    }

    /// Current health summary.
    pub async fn health(&self) -> RegistryHealth {
        let indexes = self.indexes.read().await;
        RegistryHealth {
            status: "healthy".to_string(),
            agent_count: indexes.primary.len(),
            last_flushed: indexes.last_flushed,
        }
    }

    /// Remove every record, in memory and on disk.
    pub async fn clear(&self) -> Result<(), MeshError> {
        self.store.clear().await?;
        *self.indexes.write().await = Indexes::new();
        info!(target: "mesh.registry", "registry cleared");
        Ok(())
    }

    /// Flush the index one last time and stop the background flush timer.
    pub async fn shutdown(&self) -> Result<(), MeshError> {
        self.cancel.cancel();
        self.flush_index().await?;
        info!(target: "mesh.registry", "registry shut down");
        Ok(())
    }
}
