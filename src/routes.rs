//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod proposals;
mod terms;

use crate::auth::identity_middleware;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    let api = Router::new()
        // Proposal workflow
        .route("/proposals", get(proposals::list_proposals).post(proposals::create_proposal))
        .route("/proposals/{id}", get(proposals::get_proposal).delete(proposals::delete_proposal))
        .route("/proposals/{id}/start-review", post(proposals::start_review))
        .route("/proposals/{id}/request-changes", post(proposals::request_changes))
        .route("/proposals/{id}/resubmit", post(proposals::resubmit))
        .route("/proposals/{id}/approve", post(proposals::approve))
        .route("/proposals/{id}/reject", post(proposals::reject))
        .route("/proposals/{id}/withdraw", post(proposals::withdraw))

        // Terms and their version ledger
        .route("/terms", get(terms::list_terms).post(terms::create_term))
        .route("/terms/{id}", get(terms::get_term).put(terms::edit_term))
        .route("/terms/{id}/metadata", patch(terms::update_metadata))
        .route("/terms/{id}/versions", get(terms::list_versions))
        .route("/terms/{id}/versions/{version}", get(terms::get_version))
        .route("/terms/{id}/compare", get(terms::compare_versions))
        .route("/categories", get(terms::list_categories))

        // Resolve the bearer token (if any) for every API route
        .layer(from_fn_with_state(state.clone(), identity_middleware));

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api)

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];

    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
