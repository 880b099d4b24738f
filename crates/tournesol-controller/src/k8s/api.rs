/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Kubernetes API Module
//!
//! ```rust,ignore
//! pub async fn create_k8s_client(kubeconfig_path: Option<&str>) -> Result<K8sClient, Box<dyn std::error::Error>>
//! ```
//! Creates a client from in-cluster configuration or the given kubeconfig and
//! checks that the API server answers.
//!
//! ```rust,ignore
//! pub fn result_resource(settings: &Controller) -> ApiResource
//! ```
//! Describes the watched diagnostic resource (`core.k8sgpt.ai/v1alpha1`
//! `Result` by default) for dynamic access.

use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client as K8sClient;
use kube::Config;
use tournesol_utils::config::Controller;
use tournesol_utils::logging::prelude::*;

/// Creates a Kubernetes client.
///
/// # Arguments
/// * `kubeconfig_path` - Kubeconfig to read; in-cluster or default discovery when `None`
pub async fn create_k8s_client(
    kubeconfig_path: Option<&str>,
) -> Result<K8sClient, Box<dyn std::error::Error>> {
    let config = match kubeconfig_path {
        Some(path) => {
            info!("Loading kubeconfig from {}", path);
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .map_err(|e| format!("Failed to read kubeconfig {}: {}", path, e))?;
            Config::from_custom_kubeconfig(kubeconfig, &Default::default())
                .await
                .map_err(|e| format!("Invalid kubeconfig {}: {}", path, e))?
        }
        None => Config::infer()
            .await
            .map_err(|e| format!("Failed to infer Kubernetes configuration: {}", e))?,
    };

    let client = K8sClient::try_from(config)
        .map_err(|e| format!("Failed to create Kubernetes client: {}", e))?;

    // Verify cluster connectivity before the watch starts
    let version = client
        .apiserver_version()
        .await
        .map_err(|e| format!("Failed to connect to Kubernetes cluster: {}", e))?;

    info!(
        "Successfully connected to Kubernetes cluster (version {})",
        version.git_version
    );
    Ok(client)
}

/// Dynamic resource descriptor for the configured diagnostic kind.
pub fn result_resource(settings: &Controller) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&settings.group, &settings.version, &settings.kind);
    ApiResource::from_gvk_with_plural(&gvk, &settings.plural)
}
