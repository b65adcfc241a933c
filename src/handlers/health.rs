use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

// Health handler - storage problems are reported inline, the gateway itself is up
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = match state.admin.probe().await {
        Ok(()) => state.admin.storage_type().to_string(),
        Err(err) => format!("error: {err}"),
    };
    Json(serde_json::json!({
        "status": "healthy",
        "storage": storage,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
