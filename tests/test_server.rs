//! Integration test: Server API endpoints

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use tripcast::server::{create_router, AppState, ServerConfig};

fn test_app(dir: &Path) -> axum::Router {
    common::published(dir, common::quick_run());
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        artifacts_dir: dir.to_path_buf(),
    };
    let state = Arc::new(AppState::open(config).unwrap());
    create_router(state)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(dir.path()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["models"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_schema_endpoint() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(dir.path()), get("/schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schema"], "pickup_only");
    assert_eq!(body["feature_names"].as_array().unwrap().len(), 7);
    assert_eq!(body["requires_dropoff"], false);
}

#[tokio::test]
async fn test_predict_documented_trip() {
    let dir = TempDir::new().unwrap();
    let request = post_json("/predict", common::sample_request().to_string());
    let (status, body) = send(test_app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body.as_object().unwrap();
    assert_eq!(predictions.len(), 5);
    for name in ["decision_tree", "gradient_boosting", "knn", "linear_regression", "random_forest"] {
        assert!(predictions[name].as_f64().unwrap().is_finite(), "{}", name);
    }
}

#[tokio::test]
async fn test_predict_accepts_string_coordinates() {
    let dir = TempDir::new().unwrap();
    let body = r#"{
        "pickup_datetime": "2023-06-15T08:30:00Z",
        "pickup_latitude": "40.7128",
        "pickup_longitude": "-74.0060",
        "dropoff_latitude": "40.7580",
        "dropoff_longitude": "-73.9855"
    }"#;
    let (status, _) = send(test_app(dir.path()), post_json("/predict", body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_predict_invalid_datetime() {
    let dir = TempDir::new().unwrap();
    let mut request = common::sample_request();
    request["pickup_datetime"] = "not-a-date".into();
    let (status, body) = send(test_app(dir.path()), post_json("/predict", request.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid datetime format"));
}

#[tokio::test]
async fn test_predict_missing_field() {
    let dir = TempDir::new().unwrap();
    let body = r#"{"pickup_datetime": "2023-06-15T08:30:00Z", "pickup_latitude": 40.7}"#;
    let (status, body) = send(test_app(dir.path()), post_json("/predict", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pickup_longitude"));
}

#[tokio::test]
async fn test_predict_malformed_json() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(dir.path()), post_json("/predict", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_results_endpoint() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(dir.path()), get("/results")).await;
    assert_eq!(status, StatusCode::OK);

    let report = body.as_object().unwrap();
    assert_eq!(report.len(), 5);
    assert!(report["linear_regression"]["r2_score"].as_f64().unwrap() > 0.9);
    assert!(report["knn"]["mean_squared_error"].is_number());
}

#[tokio::test]
async fn test_reload_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path());

    let smaller = common::train(
        &tripcast::training::ModelRegistry::default()
            .without("neural_network")
            .without("gradient_boosting"),
    );
    let store = tripcast::artifacts::ArtifactStore::open(dir.path()).unwrap();
    let new_id = store.publish(&smaller).unwrap();

    let (status, body) = send(app.clone(), post_json("/reload", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], new_id.as_str());

    let (_, health) = send(app, get("/health")).await;
    assert_eq!(health["models"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(dir.path()), get("/api/nothing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_method() {
    let dir = TempDir::new().unwrap();
    let response = test_app(dir.path()).oneshot(get("/predict")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(flavor = "current_thread")]
async fn test_concurrent_predictions_on_one_worker() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path());

    // Inference runs off the runtime thread, so every request completes
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        tasks.spawn(async move {
            let request = post_json("/predict", common::sample_request().to_string());
            send(app, request).await
        });
    }
    tasks.spawn(send(app, get("/health")));

    let mut completed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_object());
        completed += 1;
    }
    assert_eq!(completed, 9);
}
