//! Plain HTTP route tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::test_state;

fn test_app(root: &std::path::Path) -> axum::Router {
    jbridge::api::create_router(test_state("http://127.0.0.1:1", root))
}

#[tokio::test]
async fn test_health_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_structured_404() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/kernels")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_execute_without_upgrade_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ws/execute")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
