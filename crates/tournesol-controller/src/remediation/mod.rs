/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Remediation Engine
//!
//! Turns source files plus a diagnosed solution into proposed file edits.
//!
//! ```mermaid
//! flowchart TD
//!     A[propose] --> B{health check enabled?}
//!     B -- no --> D[chat completion with retries]
//!     B -- yes --> C{cached verdict fresh?}
//!     C -- no --> P[probe /models] --> E{healthy?}
//!     C -- yes --> E
//!     E -- yes --> D
//!     E -- no --> F[local heuristic]
//!     D -- parsed array --> R[updates]
//!     D -- exhausted / rejected / unparsable --> F
//!     F --> R
//! ```
//!
//! [`RemediationEngine::propose`] never returns an error. When the heuristic
//! is disabled, every path that would use it yields an empty result instead.

pub mod fallback;
pub mod health;
pub mod inference;

use crate::error::ControllerError;
use crate::metrics;
use crate::models::{FileUpdate, SourceFiles};
use crate::retry::{self, RetryPolicy};
use health::{EndpointHealth, HealthSnapshot};
use inference::InferenceClient;
use std::sync::Arc;
use std::time::Duration;
use tournesol_utils::config::Inference;
use tournesol_utils::logging::prelude::*;

pub struct RemediationEngine {
    client: InferenceClient,
    health: Arc<EndpointHealth>,
    policy: RetryPolicy,
    health_check: bool,
    use_fallback: bool,
}

impl RemediationEngine {
    pub fn new(settings: &Inference) -> Result<Self, ControllerError> {
        Ok(Self {
            client: InferenceClient::new(settings)?,
            health: Arc::new(EndpointHealth::new()),
            policy: RetryPolicy::inference(settings.max_retries),
            health_check: settings.health_check,
            use_fallback: settings.use_fallback,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_health(mut self, health: Arc<EndpointHealth>) -> Self {
        self.health = health;
        self
    }

    /// Shared handle on the cached endpoint verdict.
    pub fn health(&self) -> Arc<EndpointHealth> {
        self.health.clone()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Probes the endpoint now, ignoring cache freshness, and records the verdict.
    pub async fn probe_now(&self) -> bool {
        let healthy = self.client.probe().await;
        self.health.record(healthy);
        healthy
    }

    /// Proposes file edits for `files` given the diagnosed `solution`.
    pub async fn propose(&self, files: &SourceFiles, solution: &str) -> Vec<FileUpdate> {
        let inferred = self.infer(files, solution).await;
        self.settle(inferred, files, solution)
    }

    /// Like [`propose`](Self::propose), but the inference path (probe, every
    /// attempt and the backoff between them) must finish within `budget`.
    /// Past that the local fallback answers instead.
    pub async fn propose_within(
        &self,
        files: &SourceFiles,
        solution: &str,
        budget: Duration,
    ) -> Vec<FileUpdate> {
        let inferred = match tokio::time::timeout(budget, self.infer(files, solution)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::inference_requests_total()
                    .with_label_values(&["timeout"])
                    .inc();
                Err(ControllerError::Timeout(format!(
                    "inference did not finish within {:?}",
                    budget
                )))
            }
        };
        self.settle(inferred, files, solution)
    }

    fn settle(
        &self,
        inferred: Result<Vec<FileUpdate>, ControllerError>,
        files: &SourceFiles,
        solution: &str,
    ) -> Vec<FileUpdate> {
        match inferred {
            Ok(updates) => {
                info!("Inference proposed {} file updates", updates.len());
                updates
            }
            Err(reason) => {
                warn!("Inference path unavailable ({}), using local fallback", reason);
                self.fallback(files, solution)
            }
        }
    }

    async fn endpoint_available(&self) -> bool {
        if !self.health_check {
            return true;
        }
        match self.health.fresh_verdict() {
            Some(healthy) => {
                debug!("Using cached inference health verdict: {}", healthy);
                healthy
            }
            None => self.probe_now().await,
        }
    }

    async fn infer(
        &self,
        files: &SourceFiles,
        solution: &str,
    ) -> Result<Vec<FileUpdate>, ControllerError> {
        if !self.endpoint_available().await {
            return Err(ControllerError::Transport(format!(
                "inference endpoint {} is unhealthy",
                self.client.base_url()
            )));
        }

        let prompt = inference::build_prompt(files, solution);
        info!(
            "Requesting remediation for {} files ({} prompt bytes)",
            files.len(),
            prompt.len()
        );

        let content = retry::retry(&self.policy, "chat completion", || async {
            let result = self.client.complete(&prompt).await;
            self.observe_attempt(&result);
            result
        })
        .await?;

        inference::extract_file_updates(&content).map_err(|e| {
            metrics::inference_requests_total()
                .with_label_values(&["malformed"])
                .inc();
            e
        })
    }

    fn observe_attempt(&self, result: &Result<String, ControllerError>) {
        let label = match result {
            Ok(_) => {
                self.health.record(true);
                "success"
            }
            Err(ControllerError::Transport(_)) => {
                self.health.record(false);
                "unreachable"
            }
            Err(ControllerError::MalformedResponse(_)) => "malformed",
            Err(e) if e.is_transient() => "retryable",
            Err(_) => "rejected",
        };
        metrics::inference_requests_total()
            .with_label_values(&[label])
            .inc();
    }

    fn fallback(&self, files: &SourceFiles, solution: &str) -> Vec<FileUpdate> {
        if !self.use_fallback {
            info!("Local fallback disabled, no updates proposed");
            return Vec::new();
        }
        metrics::fallback_invocations_total().inc();
        fallback::propose(files, solution)
    }
}
