//! Tracing setup and the per-request logging layer
//!
//! Every request runs inside a `request` span carrying its method and path,
//! so handler events (RPC audit lines, rejected inputs) are attributed to it.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    );
    let started_at = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status().as_u16();
    let duration_ms = started_at.elapsed().as_millis();

    span.in_scope(|| {
        if response.status().is_server_error() {
            error!(status, duration_ms, "request failed");
        } else if response.status().is_client_error() {
            warn!(status, duration_ms, "request rejected");
        } else {
            info!(status, duration_ms, "request handled");
        }
    });

    response
}
