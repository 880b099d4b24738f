/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CLI Commands Module
//!
//! ```rust,ignore
//! pub async fn start(config_file: Option<String>) -> Result<(), Box<dyn std::error::Error>>
//! ```
//!
//! The controller's entry point, which:
//! 1. Loads configuration
//! 2. Initializes logging
//! 3. Connects to the cluster
//! 4. Probes the inference endpoint
//! 5. Serves health and metrics
//! 6. Runs the diagnostic watch until shutdown
//!
//! ## Startup Sequence
//!
//! ```mermaid
//! flowchart TD
//!     A[Load Config] --> B[Init Logger]
//!     B --> C[Create K8s Client]
//!     C --> D[Build Controller]
//!     D --> E[Initial Inference Probe]
//!     E --> F[Start Health Server]
//!     F --> G[Watch Results]
//!     G --> H{Event}
//!     H --> I[Dedup Gate]
//!     I --> J[Spawn Pipeline]
//!     J --> G
//! ```
//!
//! ## Signal Handling
//!
//! - SIGINT/SIGTERM stop the watch; the process then exits with status zero
//! - SIGUSR1 forces an inference endpoint probe and logs the verdict
//!
//! Any startup failure is returned to `main`, which exits non-zero.

use crate::health;
use crate::k8s;
use crate::pipeline::Controller;
use std::sync::Arc;
use std::time::Instant;
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};
use tournesol_utils::config::Settings;
use tournesol_utils::logging;
use tournesol_utils::logging::prelude::*;

pub async fn start(config_file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Settings::new(config_file)?;
    logging::init_with_format(&config.log.level, &config.log.format)
        .expect("Failed to initialize logger");
    info!("Starting Tournesol controller v{}", env!("CARGO_PKG_VERSION"));
    log_configuration(&config);

    info!("Initializing Kubernetes client");
    let k8s_client = k8s::api::create_k8s_client(config.controller.kubeconfig_path.as_deref())
        .await
        .map_err(|e| {
            error!("Cannot start without a cluster client: {}", e);
            e
        })?;

    let controller = Arc::new(Controller::new(&config)?);

    if config.inference.health_check {
        let healthy = controller.engine().probe_now().await;
        info!(
            "Initial inference endpoint check: {}",
            if healthy { "healthy" } else { "unhealthy, fallback will be used" }
        );
    }

    // Start health check HTTP server
    let health_port = config.controller.health_port.unwrap_or(8080);
    info!("Starting health check server on port {}", health_port);
    let health_router = health::configure_health_routes(health::HealthState {
        k8s_client: k8s_client.clone(),
        controller: controller.clone(),
        start_time: Instant::now(),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", health_port)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router).await {
            error!("Health check server failed: {}", e);
        }
    });

    // Create channels for shutdown coordination
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        select! {
            _ = ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        let _ = shutdown_tx.send(());
    });

    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let probe_controller = controller.clone();
    tokio::spawn(async move {
        while sigusr1.recv().await.is_some() {
            info!("Received SIGUSR1, probing inference endpoint");
            let healthy = probe_controller.engine().probe_now().await;
            info!("Inference endpoint is {}", if healthy { "healthy" } else { "unhealthy" });
        }
    });

    let resource = k8s::api::result_resource(&config.controller);
    k8s::watch::run_watch(
        k8s_client,
        resource,
        &config.controller.namespace,
        controller.clone(),
        shutdown_rx,
    )
    .await;

    info!(
        "Tournesol controller stopped after handling {} diagnostics",
        controller.router().handled_count()
    );
    Ok(())
}

fn log_configuration(config: &Settings) {
    info!(
        "Repository: {}/{}@{} via {} (token: {})",
        config.github.owner,
        config.github.repo,
        config.github.branch,
        config.github.api_url,
        if config.github.token().is_some() { "set" } else { "not set" }
    );
    info!(
        "Inference: {} model={} timeout={}s max_retries={} health_check={} use_fallback={}",
        config.inference.base_url,
        config.inference.model,
        config.inference.timeout_seconds,
        config.inference.max_retries,
        config.inference.health_check,
        config.inference.use_fallback
    );
    info!(
        "Publisher: {} escalate_unfixed={}",
        config.publisher.base_url, config.publisher.escalate_unfixed
    );
    info!(
        "Watching {}/{} {} in namespace {} (pipeline timeout {}s)",
        config.controller.group,
        config.controller.version,
        config.controller.kind,
        config.controller.namespace,
        config.controller.pipeline_timeout_seconds
    );
}
