/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use base64::Engine;
use kube::api::DynamicObject;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tournesol_controller::pipeline::Controller;
use tournesol_controller::publisher::RemediationPublisher;
use tournesol_controller::remediation::RemediationEngine;
use tournesol_controller::retry::RetryPolicy;
use tournesol_controller::source::SourceFetcher;
use tournesol_utils::config::{Github, Inference, Publisher};

pub const OWNER: &str = "mfernd";
pub const REPO: &str = "prof-tournesol";
pub const BRANCH: &str = "main";

/// A port nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

pub const OOM_DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx-oom
spec:
  template:
    spec:
      containers:
        - name: nginx
          image: nginx:1.27
          resources:
            limits:
              memory: 6Mi
";

pub fn github_settings(api_url: &str) -> Github {
    Github {
        api_url: api_url.to_string(),
        owner: OWNER.to_string(),
        repo: REPO.to_string(),
        branch: BRANCH.to_string(),
        token: Some("test-token".to_string()),
        timeout_seconds: 5,
        max_retries: 3,
    }
}

pub fn inference_settings(base_url: &str) -> Inference {
    Inference {
        base_url: base_url.to_string(),
        model: "gemma3-1b-cpu".to_string(),
        timeout_seconds: 5,
        max_retries: 3,
        health_check: true,
        use_fallback: true,
        temperature: 0.2,
        max_tokens: 4096,
    }
}

pub fn publisher_settings(base_url: &str, escalate_unfixed: bool) -> Publisher {
    Publisher {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        escalate_unfixed,
    }
}

/// Millisecond-scale schedule so retry tests stay fast.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        multiplier: 2.0,
    }
}

pub fn fetcher(api_url: &str) -> SourceFetcher {
    SourceFetcher::new(&github_settings(api_url))
        .expect("fetcher")
        .with_retry_policy(fast_policy(3))
}

pub fn engine(settings: &Inference) -> RemediationEngine {
    RemediationEngine::new(settings)
        .expect("engine")
        .with_retry_policy(fast_policy(settings.max_retries))
}

pub fn controller(
    github_url: &str,
    inference: &Inference,
    publisher: &Publisher,
    pipeline_timeout: Duration,
) -> Arc<Controller> {
    let github = github_settings(github_url);
    Arc::new(Controller::from_parts(
        fetcher(github_url),
        engine(inference),
        RemediationPublisher::new(publisher, &github).expect("publisher"),
        pipeline_timeout,
    ))
}

pub fn contents_path(path: &str) -> String {
    format!("/repos/{}/{}/contents/{}", OWNER, REPO, path)
}

pub fn dir_entry(kind: &str, path: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({"type": kind, "name": name, "path": path, "sha": "0000"})
}

pub fn file_body(path: &str, content: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    // the contents API wraps base64 at 60 columns
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    json!({
        "type": "file",
        "name": name,
        "path": path,
        "content": wrapped,
        "encoding": "base64"
    })
}

pub fn chat_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
}

pub fn result_object(
    uid: &str,
    resource_version: &str,
    name: &str,
    details: &str,
) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "core.k8sgpt.ai/v1alpha1",
        "kind": "Result",
        "metadata": {
            "name": name.replace('/', ""),
            "namespace": "k8sgpt-operator-system",
            "uid": uid,
            "resourceVersion": resource_version
        },
        "spec": {
            "name": name,
            "kind": "Pod",
            "details": details,
            "parentObject": "Deployment/nginx-oom"
        }
    }))
    .expect("valid Result object")
}
