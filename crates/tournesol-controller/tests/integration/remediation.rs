/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::*;
use serde_json::json;
use tournesol_controller::models::{FileUpdate, SourceFiles};
use tournesol_controller::remediation::health::EndpointHealth;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OOM_SOLUTION: &str = "The container was OOMKilled, increase the memory limit";

fn oom_files() -> SourceFiles {
    let mut files = SourceFiles::new();
    files.insert("deployment.yaml".to_string(), OOM_DEPLOYMENT.to_string());
    files
}

async fn mount_models(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"data": []})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_inference_reply_is_used() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gemma3-1b-cpu",
            "stream": false,
            "max_tokens": 4096
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "Here is the fix:\n[{\"path\":\"deployment.yaml\",\"content\":\"patched\"}]\nThanks",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates, vec![FileUpdate::new("deployment.yaml", "patched")]);
    assert!(engine.health_snapshot().healthy);
}

#[tokio::test]
async fn test_unhealthy_endpoint_skips_straight_to_fallback() {
    let server = MockServer::start().await;
    mount_models(&server, 503, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates.len(), 1);
    assert!(updates[0].content.contains("memory: 256Mi"));
    assert!(!engine.health_snapshot().healthy);
}

#[tokio::test]
async fn test_health_verdict_is_cached() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("[]")))
        .expect(2)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    assert!(engine.propose(&oom_files(), "nothing to do").await.is_empty());
    assert!(engine.propose(&oom_files(), "nothing to do").await.is_empty());
}

#[tokio::test]
async fn test_probe_now_ignores_cache() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 2).await;

    let engine = engine(&inference_settings(&server.uri()));
    assert!(engine.probe_now().await);
    assert!(engine.probe_now().await);
}

#[tokio::test]
async fn test_non_retryable_status_falls_back_immediately() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates.len(), 1);
    assert!(updates[0].content.contains("memory: 256Mi"));
}

#[tokio::test]
async fn test_retryable_status_exhausts_attempts_then_falls_back() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates.len(), 1);
}

#[tokio::test]
async fn test_unparsable_reply_falls_back() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply("I would raise the memory limit.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates.len(), 1);
    assert!(updates[0].content.contains("memory: 256Mi"));
}

#[tokio::test]
async fn test_disabled_fallback_yields_nothing() {
    let server = MockServer::start().await;
    mount_models(&server, 503, 1).await;

    let mut settings = inference_settings(&server.uri());
    settings.use_fallback = false;
    let engine = engine(&settings);

    assert!(engine.propose(&oom_files(), OOM_SOLUTION).await.is_empty());
}

#[tokio::test]
async fn test_disabled_health_check_sends_request_directly() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 0).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = inference_settings(&server.uri());
    settings.health_check = false;
    let engine = engine(&settings);

    assert!(engine.propose(&oom_files(), OOM_SOLUTION).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_recorded_unhealthy() {
    let mut settings = inference_settings(UNREACHABLE);
    settings.health_check = false;
    settings.max_retries = 2;
    let engine = engine(&settings);

    let updates = engine.propose(&oom_files(), OOM_SOLUTION).await;

    assert_eq!(updates.len(), 1);
    let snapshot = engine.health_snapshot();
    assert!(!snapshot.healthy);
    assert!(snapshot.last_checked.is_some());
}

#[tokio::test]
async fn test_slow_inference_falls_back_within_budget() {
    let server = MockServer::start().await;
    mount_models(&server, 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply("[]"))
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let engine = engine(&inference_settings(&server.uri()));
    let started = std::time::Instant::now();
    let updates = engine
        .propose_within(&oom_files(), OOM_SOLUTION, std::time::Duration::from_millis(300))
        .await;

    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert_eq!(updates.len(), 1);
    assert!(updates[0].content.contains("memory: 256Mi"));
}

#[tokio::test]
async fn test_engines_sharing_health_probe_once() {
    let server = MockServer::start().await;
    mount_models(&server, 503, 1).await;

    let settings = inference_settings(&server.uri());
    let shared = std::sync::Arc::new(EndpointHealth::new());
    let first = engine(&settings).with_health(shared.clone());
    let second = engine(&settings).with_health(shared.clone());

    assert_eq!(first.propose(&oom_files(), OOM_SOLUTION).await.len(), 1);
    assert_eq!(second.propose(&oom_files(), OOM_SOLUTION).await.len(), 1);
    assert!(!second.health_snapshot().healthy);
    assert_eq!(shared.fresh_verdict(), Some(false));
}
