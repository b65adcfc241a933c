use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use super::gate::{client_ip, forbidden};
use crate::error::{GateError, GateResult};
use crate::metrics::DENIED_TOTAL;
use crate::models::{AddBlacklistRequest, AddKeywordRequest, AddWhitelistRequest, EntryStatus};
use crate::state::AppState;

type AdminResponse = Result<Json<Value>, GateError>;

// Reject admin calls without the configured bearer token
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(request).await;
    };
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token_digest(token.trim()) == token_digest(expected))
        .unwrap_or(false);

    if authorized {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "admin request without valid token");
    GateError::Unauthorized.into_response()
}

// Without a token the admin routes are open, so a blacklisted client must not
// reach them and lift its own entry
pub async fn reject_blacklisted(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.admin_token.is_some() {
        return next.run(request).await;
    }
    let ip = client_ip(&request, state.trust_forwarded);
    if state.admin.refuses(ip).await {
        DENIED_TOTAL.with_label_values(&["blacklist"]).inc();
        warn!(%ip, path = %request.uri().path(), "blacklisted client refused on admin route");
        return forbidden();
    }
    next.run(request).await
}

// Compare digests rather than the raw secrets
fn token_digest(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

// Malformed JSON becomes a structured invalid_input error
fn payload<T: DeserializeOwned>(body: Result<Json<T>, JsonRejection>) -> GateResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| GateError::Validation(rejection.body_text()))
}

pub async fn status(State(state): State<Arc<AppState>>) -> AdminResponse {
    let report = state.admin.status().await?;
    Ok(Json(json!({ "ok": true, "status": report })))
}

async fn list_entries(state: &AppState, status: EntryStatus) -> AdminResponse {
    let entries = state.admin.list(status).await?;
    Ok(Json(json!({ "ok": true, "count": entries.len(), "entries": entries })))
}

async fn remove_entry(state: &AppState, status: EntryStatus, ip: &str) -> AdminResponse {
    let removed = state.admin.remove(status, ip).await?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

async fn lookup_entry(state: &AppState, status: EntryStatus, ip: &str) -> AdminResponse {
    let entry = state.admin.lookup(status, ip).await?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

pub async fn list_whitelist(State(state): State<Arc<AppState>>) -> AdminResponse {
    list_entries(&state, EntryStatus::Whitelisted).await
}

pub async fn add_whitelist(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddWhitelistRequest>, JsonRejection>,
) -> AdminResponse {
    let request = payload(body)?;
    let entry = state.admin.add_whitelist(&request.ip).await?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

pub async fn get_whitelist(State(state): State<Arc<AppState>>, Path(ip): Path<String>) -> AdminResponse {
    lookup_entry(&state, EntryStatus::Whitelisted, &ip).await
}

pub async fn remove_whitelist(State(state): State<Arc<AppState>>, Path(ip): Path<String>) -> AdminResponse {
    remove_entry(&state, EntryStatus::Whitelisted, &ip).await
}

pub async fn list_blacklist(State(state): State<Arc<AppState>>) -> AdminResponse {
    list_entries(&state, EntryStatus::Blacklisted).await
}

pub async fn add_blacklist(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddBlacklistRequest>, JsonRejection>,
) -> AdminResponse {
    let request = payload(body)?;
    let entry = state
        .admin
        .add_blacklist(&request.ip, request.reason.as_deref())
        .await?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

pub async fn get_blacklist(State(state): State<Arc<AppState>>, Path(ip): Path<String>) -> AdminResponse {
    lookup_entry(&state, EntryStatus::Blacklisted, &ip).await
}

pub async fn remove_blacklist(State(state): State<Arc<AppState>>, Path(ip): Path<String>) -> AdminResponse {
    remove_entry(&state, EntryStatus::Blacklisted, &ip).await
}

pub async fn list_keywords(State(state): State<Arc<AppState>>) -> AdminResponse {
    let keywords = state.admin.list_keywords().await?;
    Ok(Json(json!({ "ok": true, "count": keywords.len(), "entries": keywords })))
}

pub async fn add_keyword(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddKeywordRequest>, JsonRejection>,
) -> AdminResponse {
    let request = payload(body)?;
    let rule = state.admin.add_keyword(&request.keyword).await?;
    Ok(Json(json!({ "ok": true, "entry": rule })))
}

pub async fn remove_keyword(
    State(state): State<Arc<AppState>>,
    Path(keyword): Path<String>,
) -> AdminResponse {
    let removed = state.admin.remove_keyword(&keyword).await?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}
