use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %err, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match String::from_utf8(buffer) {
        Ok(text) => text.into_response(),
        Err(err) => {
            error!(error = %err, "metrics output was not utf-8");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
