/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Remediation Publisher
//!
//! Hands proposed edits to the pull-request service:
//!
//! ```text
//! POST {base_url}/pull_requests  {owner, repo, pr: {title, body, files: [{path, content}]}}
//! POST {base_url}/issues         {title, body, owner, repo}
//! ```
//!
//! Requests are sent once. A retried pull request could be created twice,
//! so a failure ends the diagnostic's pipeline run and is only logged.
//! [`ControllerError::Upstream`] means the service answered and refused;
//! [`ControllerError::Transport`] and [`ControllerError::Timeout`] mean it
//! could not be reached.

use crate::diagnostic::Diagnostic;
use crate::error::ControllerError;
use crate::metrics;
use crate::models::FileUpdate;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tournesol_utils::config::{Github, Publisher};
use tournesol_utils::logging::prelude::*;

#[derive(Debug, Serialize)]
pub struct PullRequestPayload {
    pub owner: String,
    pub repo: String,
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    pub files: Vec<FileUpdate>,
}

#[derive(Debug, Serialize)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone)]
pub struct RemediationPublisher {
    client: Client,
    base_url: String,
    owner: String,
    repo: String,
    escalate_unfixed: bool,
}

impl RemediationPublisher {
    pub fn new(publisher: &Publisher, github: &Github) -> Result<Self, ControllerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(publisher.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: publisher.base_url.trim_end_matches('/').to_string(),
            owner: github.owner.clone(),
            repo: github.repo.clone(),
            escalate_unfixed: publisher.escalate_unfixed,
        })
    }

    pub fn escalates_unfixed(&self) -> bool {
        self.escalate_unfixed
    }

    /// Opens a pull request carrying `updates` for `diagnostic`.
    pub async fn publish(
        &self,
        updates: &[FileUpdate],
        diagnostic: &Diagnostic,
    ) -> Result<String, ControllerError> {
        let payload = PullRequestPayload {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            pr: PullRequest {
                title: pr_title(diagnostic),
                body: pr_body(diagnostic),
                files: qualify_paths(updates, &diagnostic.namespace),
            },
        };

        info!(
            "[{}] Submitting pull request \"{}\" with {} files",
            diagnostic.identity,
            payload.pr.title,
            payload.pr.files.len()
        );
        self.post("pull_requests", "pull_request", &payload).await
    }

    /// Opens an issue asking a human to look at a diagnostic nothing could fix.
    pub async fn escalate(&self, diagnostic: &Diagnostic) -> Result<String, ControllerError> {
        let payload = IssuePayload {
            title: format!(
                "Manual fix needed: {} issue in namespace {}",
                diagnostic.short_name(),
                diagnostic.namespace
            ),
            body: issue_body(diagnostic),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
        };

        info!("[{}] Escalating unfixed diagnostic as an issue", diagnostic.identity);
        self.post("issues", "issue", &payload).await
    }

    async fn post<T: Serialize>(
        &self,
        route: &str,
        kind: &str,
        payload: &T,
    ) -> Result<String, ControllerError> {
        let url = format!("{}/{}", self.base_url, route);

        let response = match self.client.post(&url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to reach pull-request service at {}: {}", url, e);
                metrics::publish_requests_total()
                    .with_label_values(&[kind, "unreachable"])
                    .inc();
                return Err(ControllerError::from(e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            info!("Pull-request service accepted {} ({}): {}", kind, status, body);
            metrics::publish_requests_total()
                .with_label_values(&[kind, "success"])
                .inc();
            Ok(body)
        } else {
            error!("Pull-request service rejected {} ({}): {}", kind, status, body);
            metrics::publish_requests_total()
                .with_label_values(&[kind, "rejected"])
                .inc();
            Err(ControllerError::Upstream {
                status: status.as_u16(),
                body,
            })
        }
    }
}

pub fn pr_title(diagnostic: &Diagnostic) -> String {
    format!(
        "fix: Fixed {} issue in namespace {}",
        diagnostic.short_name(),
        diagnostic.namespace
    )
}

pub fn pr_body(diagnostic: &Diagnostic) -> String {
    format!(
        "This PR fixes an issue detected by K8sGPT for {}/{} in namespace {}. \u{1F33B}\n\n\
         **Error:** {}\n\n\
         **Solution:** {}\n\n\
         Changes were automatically generated by Prof Tournesol.",
        diagnostic.kind,
        diagnostic.short_name(),
        diagnostic.namespace,
        diagnostic.error_text,
        diagnostic.solution_text
    )
}

fn issue_body(diagnostic: &Diagnostic) -> String {
    format!(
        "K8sGPT detected an issue for {}/{} in namespace {} that could not be fixed automatically.\n\n\
         **Error:** {}\n\n\
         **Solution:** {}\n\n\
         Please take a look.",
        diagnostic.kind,
        diagnostic.short_name(),
        diagnostic.namespace,
        diagnostic.error_text,
        diagnostic.solution_text
    )
}

/// Prefixes each path with `apps/<namespace>/` unless it already has it.
pub fn qualify_paths(updates: &[FileUpdate], namespace: &str) -> Vec<FileUpdate> {
    let prefix = format!("apps/{}/", namespace);
    updates
        .iter()
        .map(|u| {
            let path = if u.path.starts_with(&prefix) {
                u.path.clone()
            } else {
                format!("{}{}", prefix, u.path)
            };
            FileUpdate::new(path, u.content.clone())
        })
        .collect()
}
