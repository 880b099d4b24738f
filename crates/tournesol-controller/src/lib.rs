/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tournesol Controller
//!
//! Tournesol watches the `Result` resources written by the k8sgpt operator and
//! tries to turn each diagnosed problem into a pull request against the
//! repository holding the affected application's manifests.
//!
//! ## Architecture
//!
//! ### Router
//! ```rust,ignore
//! pub mod router;
//! ```
//! Dedup gate: each diagnostic identity runs the pipeline at most once per
//! process lifetime.
//!
//! ### Diagnostic Extraction
//! ```rust,ignore
//! pub mod diagnostic;
//! ```
//! Namespace, kind, error and solution text from a raw resource.
//!
//! ### Source Fetcher
//! ```rust,ignore
//! pub mod source;
//! ```
//! Reads `apps/<namespace>/` through the repository contents API.
//!
//! ### Remediation Engine
//! ```rust,ignore
//! pub mod remediation;
//! ```
//! Asks the inference endpoint for edits, falling back to a memory-limit
//! heuristic for out-of-memory kills.
//!
//! ### Publisher
//! ```rust,ignore
//! pub mod publisher;
//! ```
//! Sends the edits to the pull-request service.
//!
//! ## Operation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant K8s
//!     participant Controller
//!     participant GitHub
//!     participant Inference
//!     participant PRService
//!
//!     K8s->>Controller: Result added/updated
//!     Controller->>Controller: Dedup gate
//!     Controller->>GitHub: GET contents/apps/<namespace>
//!     GitHub-->>Controller: Manifests
//!     Controller->>Inference: POST /chat/completions
//!     Inference-->>Controller: [{path, content}]
//!     Controller->>PRService: POST /pull_requests
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [github]
//! owner = "mfernd"
//! repo = "prof-tournesol"
//! branch = "main"
//!
//! [inference]
//! base_url = "http://kubeai.kubeai.svc.cluster.local:80/openai/v1"
//! model = "gemma3-1b-cpu"
//!
//! [publisher]
//! base_url = "http://gh-service.tournesol:80"
//! ```

pub mod cli;
pub mod diagnostic;
pub mod error;
pub mod health;
pub mod k8s;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod remediation;
pub mod retry;
pub mod router;
pub mod source;
