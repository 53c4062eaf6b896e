use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    Router::new()
        .route("/api/quota/check", post(handlers::check_quota))
        .route("/api/quota/:principal_id/:quota_kind", get(handlers::get_quota))
        .route("/api/policy/:quota_kind", get(handlers::get_policy))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
