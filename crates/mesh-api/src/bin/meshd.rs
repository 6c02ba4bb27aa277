// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use mesh_api::state::AppState;
use mesh_api::{build_app, ApiConfig};
use mesh_discovery::{DiscoveryConfig, DiscoveryService};
use mesh_registry::{Registry, RegistryConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meshd", version, about = "Agent mesh control plane daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8090")]
    bind: String,

    /// Directory to persist the agent registry.
    #[arg(long, default_value = ".agent-mesh/registry")]
    data_dir: PathBuf,

    /// Maximum number of agents the registry will accept.
    #[arg(long, default_value_t = 10_000)]
    max_agents: usize,

    /// Interval between background index flushes, in seconds.
    #[arg(long, default_value_t = 30)]
    flush_interval_secs: u64,

    /// Per-client-IP request quota per window.
    #[arg(long, default_value_t = 120)]
    rate_limit_max_requests: u32,

    /// Rate-limit window, in seconds.
    #[arg(long, default_value_t = 60)]
    rate_limit_window_secs: u64,

    /// Enable verbose debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("mesh=debug,mesh_registry=debug,mesh_discovery=debug,mesh_api=info")
    } else {
        EnvFilter::new("mesh=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = Registry::new(RegistryConfig {
        data_dir: args.data_dir.clone(),
        max_agents: args.max_agents,
        flush_interval: Duration::from_secs(args.flush_interval_secs),
    });
    registry
        .initialize()
        .await
        .with_context(|| format!("initialize registry at {}", args.data_dir.display()))?;

    let discovery = DiscoveryService::new(registry.clone(), DiscoveryConfig::default());
    let state = Arc::new(AppState::new(registry, discovery));

    let config = ApiConfig {
        rate_limit_max_requests: args.rate_limit_max_requests,
        rate_limit_window: Duration::from_secs(args.rate_limit_window_secs),
        ..ApiConfig::default()
    };

    let app = build_app(state, config);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, data_dir = %args.data_dir.display(), "meshd listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("serve")
}
