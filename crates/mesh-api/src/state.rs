// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared application state handed to every route handler.

use mesh_discovery::DiscoveryService;
use mesh_registry::Registry;
use std::time::Instant;

/// State shared across the router via `axum::extract::State`.
pub struct AppState {
    pub registry: Registry,
    pub discovery: DiscoveryService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Registry, discovery: DiscoveryService) -> Self {
        Self { registry, discovery, started_at: Instant::now() }
    }
}
