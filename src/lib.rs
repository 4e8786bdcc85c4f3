use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod rpc;
pub mod server;
pub mod shutdown;

use errors::{method_not_allowed, not_found};
use http::handlers;

/// Route table of the item service.
pub fn build_app() -> Router {
    Router::new()
        .route("/health", get(handlers::health).fallback(method_not_allowed))
        .route("/items", post(handlers::create_item).fallback(method_not_allowed))
        .route("/items/", get(handlers::missing_item_id).fallback(method_not_allowed))
        .route("/items/{id}", get(handlers::get_item).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn(logging::request_logging_middleware))
}

/// Route table of the JSON-RPC sum server.
pub fn build_rpc_app() -> Router {
    Router::new()
        .route("/rpc", post(handlers::rpc_endpoint).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn(logging::request_logging_middleware))
}
