//! API route definitions

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::AppState};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found. Available routes: /health, /schema, /predict, /results, /reload",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS_ORIGIN restricts browsers to one origin; unset means any
    let cors = match std::env::var("CORS_ORIGIN") {
        Ok(origin) if !origin.is_empty() && origin != "*" => match origin.parse::<axum::http::HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS_ORIGIN");
                CorsLayer::permissive()
            }
        },
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/schema", get(handlers::get_schema))
        .route("/predict", post(handlers::predict))
        .route("/results", get(handlers::get_results))
        .route("/reload", post(handlers::reload))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
