// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable persistence: one `index.json` plus one JSON file per agent.

use crate::types::{AgentRecord, RegistryStats};
use chrono::{DateTime, Utc};
use mesh_error::{ErrorCode, MeshError};
use mesh_urn::Urn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const AGENTS_DIR: &str = "agents";

/// Serialized shape of `index.json`: enough to rebuild every in-memory index
/// without re-reading every per-agent file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexFile {
    /// Canonical URN string -> per-agent filename, so the index remains the
    /// authority for URN -> file even if two URNs sanitize to the same name.
    pub entries: BTreeMap<String, String>,
    /// Cached aggregate stats, recomputed on load from `entries.len()`, the
    /// domain set, and the capability set (not persisted beyond `entries`).
    pub stats: RegistryStats,
    /// When this index file was last written.
    pub last_saved: Option<DateTime<Utc>>,
}

/// Directory-backed store for the registry's durable state.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    data_dir: PathBuf,
}

impl RegistryStore {
    /// Create a store rooted at `data_dir`. Does not touch the filesystem.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn agents_dir(&self) -> PathBuf {
        self.data_dir.join(AGENTS_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE)
    }

    /// Sanitize a URN into a safe filename: every byte outside
    /// `[A-Za-z0-9]` becomes `_`.
    pub fn sanitize_filename(urn: &Urn) -> String {
        urn.sanitized_filename()
    }

    fn agent_path(&self, urn: &Urn) -> PathBuf {
        self.agents_dir().join(format!("{}.json", Self::sanitize_filename(urn)))
    }

    /// Ensure the data and agents directories exist.
    pub async fn ensure_dirs(&self) -> Result<(), MeshError> {
        tokio::fs::create_dir_all(self.agents_dir()).await.map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("create data dir: {e}"))
                .with_context("data_dir", self.data_dir.display().to_string())
        })
    }

    /// Write a single agent record to its per-URN file via a write-then-rename
    /// so readers never observe a half-written file.
    pub async fn write_agent(&self, record: &AgentRecord) -> Result<(), MeshError> {
        let path = self.agent_path(&record.urn);
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("serialize agent record: {e}"))
        })?;
        write_atomic(&path, json.as_bytes()).await
    }

    /// Read a single agent record by its durable filename.
    pub async fn read_agent(&self, filename: &str) -> Result<AgentRecord, MeshError> {
        let path = self.agents_dir().join(filename);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("read agent file: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("parse agent file: {e}"))
                .with_context("path", path.display().to_string())
        })
    }

    /// Remove a single agent's durable file. Missing files are not an error.
    pub async fn remove_agent(&self, urn: &Urn) -> Result<(), MeshError> {
        let path = self.agent_path(urn);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MeshError::new(ErrorCode::RegistryCorrupt, format!("remove agent file: {e}"))),
        }
    }

    /// Write the index file atomically.
    pub async fn write_index(&self, index: &IndexFile) -> Result<(), MeshError> {
        let json = serde_json::to_string_pretty(index).map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("serialize index: {e}"))
        })?;
        write_atomic(&self.index_path(), json.as_bytes()).await
    }

    /// Load the index file, or an empty default if it does not exist yet.
    pub async fn load_index(&self) -> Result<IndexFile, MeshError> {
        let path = self.index_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                MeshError::new(ErrorCode::RegistryCorrupt, format!("parse index file: {e}"))
                    .with_context("path", path.display().to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexFile::default()),
            Err(e) => Err(MeshError::new(ErrorCode::RegistryCorrupt, format!("read index file: {e}"))),
        }
    }

    /// Remove every durable file under `data_dir` (agents and the index).
    pub async fn clear(&self) -> Result<(), MeshError> {
        let agents_dir = self.agents_dir();
        match tokio::fs::remove_dir_all(&agents_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MeshError::new(ErrorCode::RegistryCorrupt, format!("clear agents dir: {e}")))
            }
        }
        match tokio::fs::remove_file(self.index_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MeshError::new(ErrorCode::RegistryCorrupt, format!("clear index: {e}"))),
        }
        self.ensure_dirs().await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MeshError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            MeshError::new(ErrorCode::RegistryCorrupt, format!("create parent dir: {e}"))
        })?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| MeshError::new(ErrorCode::RegistryCorrupt, format!("write temp file: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| MeshError::new(ErrorCode::RegistryCorrupt, format!("rename into place: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_registry_test_support::sample_record;

    #[tokio::test]
    async fn write_then_read_agent_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let record = sample_record("acme", "widget-bot", "1.0.0");
        store.write_agent(&record).await.unwrap();

        let filename = format!("{}.json", RegistryStore::sanitize_filename(&record.urn));
        let loaded = store.read_agent(&filename).await.unwrap();
        assert_eq!(loaded.urn, record.urn);
        assert_eq!(loaded.name, record.name);
    }

    #[tokio::test]
    async fn missing_index_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        let index = store.load_index().await.unwrap();
        assert!(index.entries.is_empty());
    }

    #[tokio::test]
    async fn index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let mut index = IndexFile::default();
        index.entries.insert("urn:agent:acme:widget-bot@1.0.0".into(), "acme_widget_bot_1_0_0.json".into());
        index.stats.total_agents = 1;
        store.write_index(&index).await.unwrap();

        let loaded = store.load_index().await.unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.stats.total_agents, 1);
    }

    #[tokio::test]
    async fn clear_removes_agents_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let record = sample_record("acme", "widget-bot", "1.0.0");
        store.write_agent(&record).await.unwrap();
        store.write_index(&IndexFile::default()).await.unwrap();

        store.clear().await.unwrap();
        let index = store.load_index().await.unwrap();
        assert!(index.entries.is_empty());
        assert!(tokio::fs::read_dir(dir.path().join(AGENTS_DIR)).await.unwrap().next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_missing_agent_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();
        let record = sample_record("acme", "ghost-bot", "1.0.0");
        store.remove_agent(&record.urn).await.unwrap();
    }
}
