// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! mesh-api
//!
//! HTTP API surface for the agent mesh control plane: agent registration and
//! lookup, discovery queries, and the `.well-known/agent-capabilities`
//! manifest endpoints, fronted by request-id, logging, rate-limit, and CORS
//! middleware.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod well_known;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use middleware::{CorsConfig, RateLimiter};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;

/// Tunables for the rate-limit and CORS middleware layered over the router.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub cors: CorsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_requests: 120,
            rate_limit_window: Duration::from_secs(60),
            cors: CorsConfig::default(),
        }
    }
}

/// Build the full Axum router: health/stats/agent CRUD/discovery/
/// `.well-known` routes plus the cross-cutting middleware stack.
pub fn build_app(state: Arc<AppState>, config: ApiConfig) -> Router {
    let rate_limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window);

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/agents", get(handlers::list_agents).post(handlers::register_agent))
        .route("/agents/{urn}", get(handlers::get_agent))
        .route("/agents/domain/{domain}", get(handlers::list_by_domain))
        .route("/agents/capability/{capability}", get(handlers::list_by_capability))
        .route("/discover", get(handlers::discover));

    let well_known_routes = Router::new()
        .route("/agent-capabilities", get(handlers::well_known_list))
        .route("/agent-capabilities/{urn}", get(handlers::well_known_manifest));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/.well-known", well_known_routes)
        .fallback(handlers::fallback)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::request_id_middleware))
                .layer(from_fn(middleware::request_logger))
                .layer(config.cors.to_cors_layer())
                .layer(from_fn_with_state(rate_limiter, middleware::rate_limit_middleware)),
        )
}

// Re-export for callers that only need the request-scoped binary's
// ambient types without depending on `handlers`/`well_known` directly.
pub use handlers::RegisterAgentRequest;
pub use state::AppState as MeshApiState;
