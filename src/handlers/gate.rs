use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::metrics::{GATE_LATENCY, REQUESTS_TOTAL};
use crate::models::RequestInfo;
use crate::state::AppState;

// Hidden form field carrying the unix time the form was rendered
const FORM_RENDERED_FIELD: &str = "form_rendered_at";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// Client address as decided by the gate, handed on to later handlers
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

// Gate middleware - denied requests get a fixed 403 with no detail
//
// An oversized body is still gated on its path, so it is counted and a
// denied client sees the same 403; only an allowed request learns about 413.
pub async fn gate_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    REQUESTS_TOTAL.inc();
    let started = Instant::now();

    let ip = client_ip(&request, state.trust_forwarded);
    let (mut parts, body) = request.into_parts();
    let (bytes, oversized) = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => (bytes, false),
        Err(err) => {
            debug!(%ip, error = %err, "request body not buffered; gating on the path alone");
            (Bytes::new(), true)
        }
    };

    let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let info = request_info(ip, path, &parts.headers, &bytes, chrono::Utc::now());
    let verdict = state.gate.evaluate(&info, Instant::now()).await;
    GATE_LATENCY.observe(started.elapsed().as_secs_f64());

    if !verdict.allow {
        debug!(%ip, path = %info.path, reason = ?verdict.reason, "gate closed");
        return forbidden();
    }
    if oversized {
        return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
    }

    parts.extensions.insert(ClientIp(ip));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

pub(crate) fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

// With trust_forwarded the right-most X-Forwarded-For hop is used: it is the
// one appended by the proxy in front of us, the rest is client supplied.
pub(crate) fn client_ip(request: &Request, trust_forwarded: bool) -> IpAddr {
    if trust_forwarded {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.rsplit(',').next())
            .and_then(|last| last.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => {
            warn!("no peer address on request; gating as 0.0.0.0");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

// Build the gate's view of a request: decoded path, decoded body text and form age
pub fn request_info(
    ip: IpAddr,
    path_and_query: &str,
    headers: &HeaderMap,
    body: &Bytes,
    now: chrono::DateTime<chrono::Utc>,
) -> RequestInfo {
    let path = decode_target(path_and_query);
    let mut info = RequestInfo::new(ip, path);
    if body.is_empty() {
        return info;
    }

    if is_form(headers) {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(fields) => {
                info.form_age = form_age(&fields, now);
                let text: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                info.body = text.join("&");
                return info;
            }
            Err(err) => debug!(%ip, error = %err, "form body did not decode; inspecting raw text"),
        }
    }
    info.body = String::from_utf8_lossy(body).into_owned();
    info
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn form_age(fields: &[(String, String)], now: chrono::DateTime<chrono::Utc>) -> Option<f64> {
    let rendered: f64 = fields
        .iter()
        .find(|(key, _)| key == FORM_RENDERED_FIELD)
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|secs: &f64| secs.is_finite())?;
    let now_secs = now.timestamp_millis() as f64 / 1000.0;
    Some(now_secs - rendered)
}

// '+' only means space in the query string
fn decode_target(raw: &str) -> String {
    match raw.split_once('?') {
        Some((path, query)) => format!("{}?{}", decode(path), decode(&query.replace('+', " "))),
        None => decode(raw),
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
