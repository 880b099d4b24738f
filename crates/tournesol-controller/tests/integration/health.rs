/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::*;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use kube::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tournesol_controller::health::{configure_health_routes, HealthState};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Kubernetes client talking to a mock API server.
fn mock_k8s_client(server: &MockServer) -> Client {
    let uri: hyper::Uri = server.uri().parse().expect("valid mock server uri");
    Client::try_from(kube::Config::new(uri)).expect("Failed to create Kubernetes client for tests")
}

async fn mount_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "major": "1",
            "minor": "30",
            "gitVersion": "v1.30.0",
            "gitCommit": "abc",
            "gitTreeState": "clean",
            "buildDate": "2024-04-17T00:00:00Z",
            "goVersion": "go1.22.2",
            "compiler": "gc",
            "platform": "linux/amd64"
        })))
        .mount(server)
        .await;
}

fn create_test_app(api_server: &MockServer) -> (Router, HealthState) {
    let state = HealthState {
        k8s_client: mock_k8s_client(api_server),
        controller: controller(
            UNREACHABLE,
            &inference_settings(UNREACHABLE),
            &publisher_settings(UNREACHABLE, false),
            Duration::from_secs(1),
        ),
        start_time: Instant::now(),
    };
    (configure_health_routes(state.clone()), state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthz_endpoint() {
    let api_server = MockServer::start().await;
    let (app, _) = create_test_app(&api_server);

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_readyz_follows_api_server() {
    let api_server = MockServer::start().await;
    let (app, _) = create_test_app(&api_server);
    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    mount_version(&api_server).await;
    let (app, _) = create_test_app(&api_server);
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Ready");
}

#[tokio::test]
async fn test_health_reports_inference_and_handled_count() {
    let api_server = MockServer::start().await;
    mount_version(&api_server).await;
    let (app, state) = create_test_app(&api_server);

    state
        .controller
        .router()
        .admit(tournesol_controller::router::EventKind::Added, "uid-1", Some("1"));
    state.controller.engine().health().record(false);

    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["kubernetes"]["connected"], true);
    assert_eq!(json["inference"]["healthy"], false);
    assert_eq!(json["inference"]["seconds_since_check"], 0);
    assert_eq!(json["diagnostics_handled"], 1);
    assert!(json["version"].is_string());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_unavailable_without_api_server() {
    let api_server = MockServer::start().await;
    let (app, _) = create_test_app(&api_server);

    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["kubernetes"]["connected"], false);
    assert!(json["kubernetes"]["error"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let api_server = MockServer::start().await;
    let (app, _) = create_test_app(&api_server);
    tournesol_controller::metrics::fallback_invocations_total().inc();

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("tournesol_fallback_invocations_total"));
}
