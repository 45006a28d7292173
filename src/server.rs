//! Web server module.
//!
//! Serves the Prometheus scrape endpoint and a liveness probe.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

/// Default scrape path.
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Create the Axum router with all routes.
///
/// An empty `telemetry_path` falls back to [`DEFAULT_TELEMETRY_PATH`].
pub fn create_router(state: AppState, telemetry_path: &str) -> Router {
    let app_state = Arc::new(state);
    let telemetry_path = match telemetry_path.trim() {
        "" => DEFAULT_TELEMETRY_PATH.to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{}", p),
    };

    Router::new()
        .route(&telemetry_path, get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Scrape endpoint: every registered collector in the text exposition format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}
