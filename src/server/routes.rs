//! Router definition for the bridge endpoints

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::{middleware, routing::*, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::server::handlers;
use crate::server::rate_limit::{self, RateLimiter};
use crate::server::BridgeState;

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the router: CORS outermost, then body limit, then rate limiting.
pub fn create_router(
    state: &BridgeState,
    limiter: Arc<RateLimiter>,
    body_limit_bytes: usize,
) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/status", get(handlers::status))
        .route("/qr", get(handlers::qr))
        .route("/about", get(handlers::about))
        .route("/send", post(handlers::send))
        .route("/logout", post(handlers::logout))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limiter, rate_limit::enforce))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(cors_layer())
}
