#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;

use ipgate::config::GateConfig;
use ipgate::handlers;
use ipgate::state::AppState;
use ipgate::store::{MemoryStore, ReputationStore};

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build reqwest client")
}

pub fn memory_state(config: GateConfig) -> AppState {
    let store: Arc<dyn ReputationStore> = Arc::new(MemoryStore::new());
    AppState::new(store, config, client())
}

pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no addr");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            eprintln!("test server error: {err}");
        }
    });
    tokio::task::yield_now().await;
    addr
}

pub async fn spawn_gateway(state: AppState) -> SocketAddr {
    serve(handlers::routes(Arc::new(state))).await
}

// Upstream that answers every request with "upstream <method> <path>"
pub async fn spawn_upstream() -> SocketAddr {
    let router = Router::new().fallback(|request: Request| async move {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_string();
        format!("upstream {} {} from {}", request.method(), path, forwarded)
    });
    serve(router).await
}
