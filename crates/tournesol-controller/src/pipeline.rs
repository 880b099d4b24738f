/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Remediation Pipeline
//!
//! Owns the per-process state (dedup map, endpoint health, HTTP clients) and
//! drives one diagnostic from "observed" to "fix proposed or abandoned":
//!
//! ```mermaid
//! sequenceDiagram
//!     participant W as Watch loop
//!     participant R as Router
//!     participant F as Fetcher
//!     participant E as Engine
//!     participant P as Publisher
//!     W->>R: admit(kind, identity, version)
//!     R-->>W: Admitted
//!     W->>F: fetch(namespace)
//!     F-->>W: files
//!     W->>E: propose(files, solution)
//!     E-->>W: updates
//!     W->>P: publish(updates, diagnostic)
//! ```
//!
//! Each admitted event runs in its own Tokio task under the pipeline
//! deadline. The inference phase gets what is left of that deadline less a
//! quarter kept for publishing, so a hanging endpoint still leaves room for
//! the local fallback. Whatever the outcome, the identity is marked done
//! afterwards.

use crate::diagnostic::{self, Diagnostic, RawDiagnostic};
use crate::error::ControllerError;
use crate::metrics;
use crate::publisher::RemediationPublisher;
use crate::remediation::RemediationEngine;
use crate::router::{Admission, DedupRouter, EventKind};
use crate::source::SourceFetcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tournesol_utils::logging::prelude::*;
use tournesol_utils::Settings;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No source files for the namespace
    NoSources,
    /// Source files could not be fetched
    FetchFailed(ControllerError),
    /// Neither inference nor the heuristic proposed a change
    NoRemediation { escalated: bool },
    /// The pull-request service accepted the change
    Published,
    /// The pull-request service refused or could not be reached
    PublishFailed(ControllerError),
    /// The pipeline deadline expired
    TimedOut,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::NoSources => "no_sources",
            Outcome::FetchFailed(_) => "fetch_failed",
            Outcome::NoRemediation { .. } => "no_remediation",
            Outcome::Published => "published",
            Outcome::PublishFailed(_) => "publish_failed",
            Outcome::TimedOut => "timed_out",
        }
    }
}

pub struct Controller {
    router: DedupRouter,
    fetcher: SourceFetcher,
    engine: RemediationEngine,
    publisher: RemediationPublisher,
    pipeline_timeout: Duration,
}

impl Controller {
    pub fn new(settings: &Settings) -> Result<Self, ControllerError> {
        Ok(Self::from_parts(
            SourceFetcher::new(&settings.github)?,
            RemediationEngine::new(&settings.inference)?,
            RemediationPublisher::new(&settings.publisher, &settings.github)?,
            Duration::from_secs(settings.controller.pipeline_timeout_seconds),
        ))
    }

    pub fn from_parts(
        fetcher: SourceFetcher,
        engine: RemediationEngine,
        publisher: RemediationPublisher,
        pipeline_timeout: Duration,
    ) -> Self {
        Self {
            router: DedupRouter::new(),
            fetcher,
            engine,
            publisher,
            pipeline_timeout,
        }
    }

    pub fn router(&self) -> &DedupRouter {
        &self.router
    }

    pub fn engine(&self) -> &RemediationEngine {
        &self.engine
    }

    /// Passes the event through the dedup gate and, when admitted, spawns
    /// its pipeline run. Returns the task handle of the spawned run.
    pub fn dispatch(
        self: &Arc<Self>,
        kind: EventKind,
        raw: RawDiagnostic,
    ) -> Option<JoinHandle<Outcome>> {
        let identity = raw.identity();
        let admission = self
            .router
            .admit(kind, &identity, raw.resource_version.as_deref());

        if admission != Admission::Admitted {
            info!(
                "[{}] Skipping {} event: {}",
                identity,
                kind.as_str(),
                admission.reason()
            );
            metrics::events_skipped_total()
                .with_label_values(&[admission.reason()])
                .inc();
            return None;
        }

        let diagnostic = diagnostic::extract(&raw);
        info!(
            "[{}] Admitted {} event for {} {} in namespace {}",
            identity,
            kind.as_str(),
            diagnostic.kind,
            diagnostic.resource_name,
            diagnostic.namespace
        );

        let controller = self.clone();
        Some(tokio::spawn(async move { controller.process(&diagnostic).await }))
    }

    /// Runs the pipeline under the deadline, records the outcome and marks
    /// the identity done.
    pub async fn process(&self, diagnostic: &Diagnostic) -> Outcome {
        let started = Instant::now();

        let deadline = started + self.pipeline_timeout;
        let run = self.run_pipeline(diagnostic, deadline);
        let outcome = match tokio::time::timeout(self.pipeline_timeout, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    "[{}] Pipeline exceeded its {:?} deadline",
                    diagnostic.identity, self.pipeline_timeout
                );
                Outcome::TimedOut
            }
        };

        self.router.mark_done(&diagnostic.identity);
        metrics::pipeline_outcomes_total()
            .with_label_values(&[outcome.label()])
            .inc();
        metrics::pipeline_duration_seconds()
            .with_label_values(&[])
            .observe(started.elapsed().as_secs_f64());
        info!(
            "[{}] Pipeline finished: {} in {:?}",
            diagnostic.identity,
            outcome.label(),
            started.elapsed()
        );
        outcome
    }

    /// Time the inference phase may use: whatever is left before `deadline`,
    /// less a quarter of the pipeline budget kept back for publishing.
    fn inference_budget(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(self.pipeline_timeout / 4)
    }

    async fn run_pipeline(&self, diagnostic: &Diagnostic, deadline: Instant) -> Outcome {
        let id = &diagnostic.identity;

        let files = match self.fetcher.fetch(&diagnostic.namespace).await {
            Ok(files) => files,
            Err(ControllerError::NotFound(what)) => {
                info!("[{}] Nothing to fix, no sources: {}", id, what);
                return Outcome::NoSources;
            }
            Err(e) => {
                error!("[{}] Failed to fetch sources: {}", id, e);
                return Outcome::FetchFailed(e);
            }
        };
        info!("[{}] Fetched {} source files", id, files.len());

        let budget = self.inference_budget(deadline);
        debug!("[{}] Inference budget {:?}", id, budget);
        let updates = self
            .engine
            .propose_within(&files, &diagnostic.solution_text, budget)
            .await;
        if updates.is_empty() {
            info!("[{}] No file updates proposed", id);
            let escalated = self.escalate(diagnostic).await;
            return Outcome::NoRemediation { escalated };
        }

        match self.publisher.publish(&updates, diagnostic).await {
            Ok(_) => {
                info!("[{}] Published {} file updates", id, updates.len());
                Outcome::Published
            }
            Err(e) => {
                error!("[{}] Publishing failed, not retrying: {}", id, e);
                Outcome::PublishFailed(e)
            }
        }
    }

    async fn escalate(&self, diagnostic: &Diagnostic) -> bool {
        if !self.publisher.escalates_unfixed() {
            return false;
        }
        match self.publisher.escalate(diagnostic).await {
            Ok(_) => true,
            Err(e) => {
                warn!("[{}] Escalation failed: {}", diagnostic.identity, e);
                false
            }
        }
    }
}
