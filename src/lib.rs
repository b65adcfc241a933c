//! Request-gating gateway: IP reputation lists, sliding-window rate limiting
//! and keyword blocking in front of a website, plus admin endpoints to curate
//! the lists.

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Args, StorageKind};
use crate::state::AppState;
use crate::store::{FileStore, MemoryStore, ReputationStore};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open the configured store and assemble the shared state.
pub async fn build_state(args: &Args) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let config = args.gate_config()?;
    let store: Arc<dyn ReputationStore> = match args.storage {
        StorageKind::File => Arc::new(FileStore::open(&args.data_dir, args.io_timeout()).await?),
        StorageKind::Memory => Arc::new(MemoryStore::new()),
    };

    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .map_err(|err| format!("failed to build upstream client: {err}"))?;

    let mut state = AppState::new(store, config, client);
    state.upstream = args.upstream.clone();
    state.admin_token = args.admin_token.clone().filter(|token| !token.trim().is_empty());
    state.trust_forwarded = args.trust_forwarded;
    state.max_body_bytes = args.max_body_bytes;
    Ok(Arc::new(state))
}

/// Build the shared state, wire routes, and run the HTTP server.
pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let state = build_state(&args).await?;
    info!(
        storage = state.admin.storage_type(),
        protection = args.protection,
        rate_window = args.rate_window,
        rate_max = args.rate_max,
        rate_flood = args.rate_flood,
        min_form_time = args.min_form_time,
        "gate configured"
    );
    match &args.upstream {
        Some(upstream) => info!("forwarding allowed requests to {upstream}"),
        None => warn!("no upstream configured; allowed requests get 404"),
    }
    if state.admin_token.is_none() {
        warn!("admin endpoints are open; set IPGATE_ADMIN_TOKEN to protect them");
    }

    let app = handlers::routes(state);
    let listener = tokio::net::TcpListener::bind(args.listen_addr()).await?;
    info!("listening on {}", args.listen_addr());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("could not listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
