/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::*;
use serde_json::json;
use tournesol_controller::error::ControllerError;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_json(server: &MockServer, repo_path: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(contents_path(repo_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_walks_directories_and_keys_relative_paths() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(contents_path("apps/nginx-unstable")))
        .and(query_param("ref", BRANCH))
        .and(header("authorization", "token test-token"))
        .and(header("accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            dir_entry("file", "apps/nginx-unstable/deployment.yaml"),
            dir_entry("dir", "apps/nginx-unstable/config"),
            dir_entry("symlink", "apps/nginx-unstable/link"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "apps/nginx-unstable/config",
        json!([dir_entry("file", "apps/nginx-unstable/config/cm.yaml")]),
    )
    .await;
    mount_json(
        &server,
        "apps/nginx-unstable/deployment.yaml",
        file_body("apps/nginx-unstable/deployment.yaml", OOM_DEPLOYMENT),
    )
    .await;
    mount_json(
        &server,
        "apps/nginx-unstable/config/cm.yaml",
        file_body("apps/nginx-unstable/config/cm.yaml", "kind: ConfigMap\n"),
    )
    .await;

    let files = fetcher(&server.uri()).fetch("nginx-unstable").await.unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(files["deployment.yaml"], OOM_DEPLOYMENT);
    assert_eq!(files["config/cm.yaml"], "kind: ConfigMap\n");
}

#[tokio::test]
async fn test_missing_namespace_directory_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(contents_path("apps/ghost")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri()).fetch("ghost").await.unwrap_err();
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn test_empty_directory_is_not_found() {
    let server = MockServer::start().await;
    mount_json(&server, "apps/empty", json!([])).await;

    let err = fetcher(&server.uri()).fetch("empty").await.unwrap_err();
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn test_failing_subdirectory_is_skipped() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "apps/shop",
        json!([
            dir_entry("dir", "apps/shop/broken"),
            dir_entry("file", "apps/shop/deployment.yaml"),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(contents_path("apps/shop/broken")))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "apps/shop/deployment.yaml",
        file_body("apps/shop/deployment.yaml", "kind: Deployment\n"),
    )
    .await;

    let files = fetcher(&server.uri()).fetch("shop").await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(files.contains_key("deployment.yaml"));
}

#[tokio::test]
async fn test_rate_limited_file_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "apps/busy",
        json!([dir_entry("file", "apps/busy/deployment.yaml")]),
    )
    .await;
    // reset far in the future: the capped backoff schedule applies instead
    Mock::given(method("GET"))
        .and(path(contents_path("apps/busy/deployment.yaml")))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("X-RateLimit-Reset", "99999999999")
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri()).fetch("busy").await.unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_rate_limited_file_recovers() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "apps/busy",
        json!([dir_entry("file", "apps/busy/deployment.yaml")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(contents_path("apps/busy/deployment.yaml")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "apps/busy/deployment.yaml",
        file_body("apps/busy/deployment.yaml", "kind: Deployment\n"),
    )
    .await;

    let files = fetcher(&server.uri()).fetch("busy").await.unwrap();
    assert_eq!(files["deployment.yaml"], "kind: Deployment\n");
}

#[tokio::test]
async fn test_namespace_path_that_is_a_file() {
    let server = MockServer::start().await;
    mount_json(&server, "apps/solo", file_body("apps/solo", "kind: Deployment\n")).await;

    let files = fetcher(&server.uri()).fetch("solo").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files["solo"], "kind: Deployment\n");
}

#[tokio::test]
async fn test_unexpected_shape_is_malformed() {
    let server = MockServer::start().await;
    mount_json(&server, "apps/odd", json!({"message": "neither file nor listing"})).await;

    let err = fetcher(&server.uri()).fetch("odd").await.unwrap_err();
    assert!(matches!(err, ControllerError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(contents_path("apps/locked")))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri()).fetch("locked").await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::Upstream {
            status: 401,
            body: "Bad credentials".to_string()
        }
    );
}
