mod admin;
mod gate;
mod health;
mod metrics;
mod proxy;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get};
use std::sync::Arc;

use crate::state::AppState;

pub use admin::{reject_blacklisted, require_admin_token};
pub use gate::{ClientIp, gate_request, request_info};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use proxy::forward_handler;

// Admin routes sit behind the token check (or, when open, the blacklist),
// everything else behind the gate
pub fn routes(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/status", get(admin::status))
        .route("/whitelist", get(admin::list_whitelist).post(admin::add_whitelist))
        .route("/whitelist/{ip}", get(admin::get_whitelist).delete(admin::remove_whitelist))
        .route("/blacklist", get(admin::list_blacklist).post(admin::add_blacklist))
        .route("/blacklist/{ip}", get(admin::get_blacklist).delete(admin::remove_blacklist))
        .route("/keywords", get(admin::list_keywords).post(admin::add_keyword))
        .route("/keywords/{keyword}", axum::routing::delete(admin::remove_keyword))
        .route_layer(from_fn_with_state(state.clone(), require_admin_token))
        .route_layer(from_fn_with_state(state.clone(), reject_blacklisted));

    let gated_routes = Router::new()
        .route("/", any(forward_handler))
        .route("/{*path}", any(forward_handler))
        .route_layer(from_fn_with_state(state.clone(), gate_request));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(admin_routes)
        .merge(gated_routes)
        .with_state(state)
}
