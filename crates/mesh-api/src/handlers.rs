// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers for the agent mesh HTTP API.

use crate::error::ApiError;
use crate::state::AppState;
use crate::well_known;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mesh_discovery::DiscoveryQuery;
use mesh_registry::AgentRecord;
use mesh_urn::Urn;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Body accepted by `POST /api/v1/agents`: an [`AgentRecord`] without the
/// server-stamped lifecycle timestamps.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub urn: String,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeMap<String, mesh_registry::CapabilityEntry>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<serde_json::Value>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry_health = state.registry.health().await;
    Json(json!({
        "status": registry_health.status,
        "registry": registry_health,
        "time": Utc::now().to_rfc3339(),
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry_stats = state.registry.stats().await;
    Json(json!({
        "registry": registry_stats,
        "process": {
            "uptimeSeconds": state.started_at.elapsed().as_secs(),
        },
    }))
}

pub async fn list_agents(
    Query(query): Query<DiscoveryQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<mesh_discovery::DiscoveryResult>, ApiError> {
    let result = state.discovery.discover(query).await?;
    Ok(Json(result))
}

pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let urn = Urn::parse(&req.urn)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid urn: {e}")))?;
    let now = Utc::now();
    let record = AgentRecord {
        urn,
        name: req.name,
        version: req.version,
        description: req.description,
        capabilities: req.capabilities,
        endpoints: req.endpoints,
        auth: req.auth,
        registered_at: now,
        last_updated: now,
    };

    let registered = state.registry.register(record).await?;
    state.discovery.invalidate_cache().await;
    Ok((StatusCode::CREATED, Json(registered)))
}

pub async fn get_agent(
    Path(urn_raw): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<AgentRecord>, ApiError> {
    let urn = Urn::parse(&urn_raw)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid urn: {e}")))?;
    let record = state
        .registry
        .get(&urn)
        .await
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "agent not found"))?;
    Ok(Json(record))
}

pub async fn list_by_domain(
    Path(domain): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.registry.list_by_domain(&domain).await)
}

pub async fn list_by_capability(
    Path(capability): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.registry.search_by_capability(&capability).await)
}

pub async fn discover(
    Query(query): Query<DiscoveryQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.include_health {
        let (result, annotated) = state.discovery.discover_with_health(query).await?;
        let mut body = serde_json::to_value(&result).unwrap_or_default();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("agents".to_string(), serde_json::to_value(&annotated).unwrap_or_default());
        }
        return Ok(Json(body));
    }
    let result = state.discovery.discover(query).await?;
    Ok(Json(serde_json::to_value(&result).unwrap_or_default()))
}

pub async fn well_known_list(
    Query(params): Query<BTreeMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let domain = params.get("domain").cloned();
    let records = match &domain {
        Some(d) => state.registry.list_by_domain(d).await,
        None => state.registry.all().await,
    };
    Json(well_known::to_list(domain.as_deref(), &records))
}

pub async fn well_known_manifest(
    Path(urn_raw): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let urn = Urn::parse(&urn_raw)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid urn: {e}")))?;
    let record = state
        .registry
        .get(&urn)
        .await
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "agent not found"))?;
    Ok(Json(well_known::to_manifest(&record)))
}

pub async fn fallback() -> impl IntoResponse {
    ApiError::not_found_with_routes(&[
        "GET /api/v1/health",
        "GET /api/v1/stats",
        "GET /api/v1/agents",
        "POST /api/v1/agents",
        "GET /api/v1/agents/{urn}",
        "GET /api/v1/agents/domain/{domain}",
        "GET /api/v1/agents/capability/{capability}",
        "GET /api/v1/discover",
        "GET /.well-known/agent-capabilities",
        "GET /.well-known/agent-capabilities/{urn}",
    ])
}
