/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Diagnostic Watch Loop
//!
//! Streams diagnostic resources from one namespace and hands each change to
//! the [`Controller`]. The watcher reports objects as `InitApply` during the
//! initial listing and `Apply` afterwards, without telling creation from
//! modification; an `Apply` for an identity the router has never seen is
//! treated as an add.

use crate::diagnostic::RawDiagnostic;
use crate::metrics;
use crate::pipeline::{Controller, Outcome};
use crate::router::EventKind;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client as K8sClient;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tournesol_utils::logging::prelude::*;

/// Maps one watcher event onto the controller. Returns the spawned pipeline
/// task when the event was admitted.
pub fn handle_watch_event(
    controller: &Arc<Controller>,
    event: Event<DynamicObject>,
) -> Option<JoinHandle<Outcome>> {
    match event {
        Event::Init => {
            debug!("Watch (re)list started");
            None
        }
        Event::InitDone => {
            debug!("Watch (re)list complete");
            None
        }
        Event::InitApply(obj) => dispatch(controller, EventKind::Added, &obj),
        Event::Apply(obj) => {
            let raw = RawDiagnostic::from_object(&obj);
            let kind = if controller.router().has_seen(&raw.identity()) {
                EventKind::Updated
            } else {
                EventKind::Added
            };
            dispatch(controller, kind, &obj)
        }
        Event::Delete(obj) => {
            metrics::events_received_total()
                .with_label_values(&["deleted"])
                .inc();
            info!(
                "Diagnostic {} deleted, ignoring",
                obj.metadata.name.as_deref().unwrap_or("<unnamed>")
            );
            None
        }
    }
}

fn dispatch(
    controller: &Arc<Controller>,
    kind: EventKind,
    obj: &DynamicObject,
) -> Option<JoinHandle<Outcome>> {
    metrics::events_received_total()
        .with_label_values(&[kind.as_str()])
        .inc();
    controller.dispatch(kind, RawDiagnostic::from_object(obj))
}

/// Watches `resource` objects in `namespace` until a shutdown message
/// arrives or the stream ends. In-flight pipeline tasks are left to finish
/// on their own.
pub async fn run_watch(
    client: K8sClient,
    resource: ApiResource,
    namespace: &str,
    controller: Arc<Controller>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let api: Api<DynamicObject> = Api::namespaced_with(client, namespace, &resource);
    let mut stream = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    info!(
        "Watching {} resources in namespace {}",
        resource.kind, namespace
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Stopping diagnostic watch");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    handle_watch_event(&controller, event);
                }
                Some(Err(e)) => warn!("Watch stream error: {}", e),
                None => {
                    warn!("Watch stream ended");
                    break;
                }
            }
        }
    }
}
