use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GateError;
use crate::handlers::ClientIp;
use crate::state::AppState;

// Headers that only mean something on a single connection
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

// Relay an allowed request to the protected site
pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, GateError> {
    let Some(upstream) = state.upstream.as_deref() else {
        return Err(GateError::NotFound(format!("no route for {}", request.uri().path())));
    };

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|err| GateError::Validation(err.to_string()))?;

    let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("{}{}", upstream.trim_end_matches('/'), path);

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    if let Some(ClientIp(ip)) = parts.extensions.get::<ClientIp>() {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.append("x-forwarded-for", value);
        }
    }

    debug!(method = %parts.method, %target, "forwarding");
    let upstream_response = state
        .client
        .request(parts.method.clone(), &target)
        .headers(headers)
        .body(bytes)
        .send()
        .await
        .map_err(|err| {
            warn!(%target, error = %err, "upstream request failed");
            GateError::Upstream(err.to_string())
        })?;

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let body = upstream_response
        .bytes()
        .await
        .map_err(|err| GateError::Upstream(err.to_string()))?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}
