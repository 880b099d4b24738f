/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Health Check Module
//!
//! HTTP endpoints used by Kubernetes probes and by operators.
//!
//! ## Endpoints
//!
//! - `GET /healthz`: Simple liveness check (returns 200 OK if process is alive)
//! - `GET /readyz`: Readiness check with Kubernetes API connectivity validation
//! - `GET /health`: Detailed health status with JSON response
//! - `GET /metrics`: Prometheus text exposition
//!
//! ## Health Status Structure
//!
//! The `/health` endpoint returns:
//! - Overall health status
//! - Kubernetes API connection status
//! - Cached inference endpoint verdict
//! - Number of diagnostics handled
//! - Service uptime
//! - Application version
//! - Timestamp
//!
//! An unhealthy inference endpoint only degrades the status: diagnostics are
//! still handled through the local heuristic.

use crate::metrics;
use crate::pipeline::Controller;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use kube::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tournesol_utils::logging::prelude::*;

/// Shared state for health endpoints
#[derive(Clone)]
pub struct HealthState {
    pub k8s_client: Client,
    pub controller: Arc<Controller>,
    pub start_time: Instant,
}

/// Health status response structure
#[derive(Serialize)]
struct HealthStatus {
    status: String,
    kubernetes: KubernetesStatus,
    inference: InferenceStatus,
    diagnostics_handled: usize,
    uptime_seconds: u64,
    version: String,
    timestamp: String,
}

/// Kubernetes health status
#[derive(Serialize)]
struct KubernetesStatus {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Cached inference endpoint verdict
#[derive(Serialize)]
struct InferenceStatus {
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds_since_check: Option<u64>,
}

/// Configures and returns the health check router
pub fn configure_health_routes(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Returns 200 OK if the Kubernetes API is reachable, 503 if not.
async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    match state.k8s_client.apiserver_version().await {
        Ok(_) => (StatusCode::OK, "Ready"),
        Err(e) => {
            error!("Kubernetes API connectivity check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Kubernetes API unavailable",
            )
        }
    }
}

/// Returns 200 unless the Kubernetes API is unreachable.
async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let (k8s_connected, k8s_error) = match state.k8s_client.apiserver_version().await {
        Ok(_) => (true, None),
        Err(e) => {
            error!("Kubernetes API connectivity check failed: {:?}", e);
            (false, Some(e.to_string()))
        }
    };

    let snapshot = state.controller.engine().health_snapshot();
    let inference_healthy = snapshot.healthy;

    let (overall_status, status_code) = match (k8s_connected, inference_healthy) {
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        (true, false) => ("degraded", StatusCode::OK),
        (true, true) => ("healthy", StatusCode::OK),
    };

    let health_status = HealthStatus {
        status: overall_status.to_string(),
        kubernetes: KubernetesStatus {
            connected: k8s_connected,
            error: k8s_error,
        },
        inference: InferenceStatus {
            healthy: inference_healthy,
            seconds_since_check: snapshot.age().map(|d| d.as_secs()),
        },
        diagnostics_handled: state.controller.router().handled_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (status_code, Json(health_status))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
