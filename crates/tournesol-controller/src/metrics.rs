/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! Prometheus metrics for the Tournesol controller: watch events, dedup
//! decisions, pipeline outcomes and the calls made to the inference endpoint
//! and the pull-request service.

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all controller metrics
static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("Failed to create counter {}: {}", name, e));
    registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("Failed to register counter {}: {}", name, e));
    counter
}

/// Watch events received
/// Labels: kind (added/updated/deleted)
pub fn events_received_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        counter_vec(
            "tournesol_events_received_total",
            "Total number of diagnostic watch events received by type",
            &["kind"],
        )
    })
}

/// Events rejected by the dedup gate
/// Labels: reason (processing/done/unchanged_revision/missing_identity)
pub fn events_skipped_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        counter_vec(
            "tournesol_events_skipped_total",
            "Total number of diagnostic events skipped by the dedup gate",
            &["reason"],
        )
    })
}

/// Finished pipeline runs
/// Labels: outcome (published/no_sources/fetch_failed/no_remediation/publish_failed/timed_out)
pub fn pipeline_outcomes_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        counter_vec(
            "tournesol_pipeline_outcomes_total",
            "Total number of pipeline runs by outcome",
            &["outcome"],
        )
    })
}

/// Pipeline run duration histogram
pub fn pipeline_duration_seconds() -> &'static HistogramVec {
    static HISTOGRAM: OnceLock<HistogramVec> = OnceLock::new();
    HISTOGRAM.get_or_init(|| {
        let opts = HistogramOpts::new(
            "tournesol_pipeline_duration_seconds",
            "Pipeline run latency distribution in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]);
        let histogram = HistogramVec::new(opts, &[])
            .unwrap_or_else(|e| panic!("Failed to create pipeline duration histogram: {}", e));
        registry()
            .register(Box::new(histogram.clone()))
            .unwrap_or_else(|e| panic!("Failed to register pipeline duration histogram: {}", e));
        histogram
    })
}

/// Chat completion attempts
/// Labels: result (success/retryable/rejected/unreachable/malformed)
pub fn inference_requests_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        counter_vec(
            "tournesol_inference_requests_total",
            "Total number of chat completion attempts by result",
            &["result"],
        )
    })
}

/// Local heuristic invocations
pub fn fallback_invocations_total() -> &'static IntCounter {
    static COUNTER: OnceLock<IntCounter> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "tournesol_fallback_invocations_total",
            "Total number of times the local remediation heuristic ran",
        );
        let counter = IntCounter::with_opts(opts)
            .unwrap_or_else(|e| panic!("Failed to create fallback counter: {}", e));
        registry()
            .register(Box::new(counter.clone()))
            .unwrap_or_else(|e| panic!("Failed to register fallback counter: {}", e));
        counter
    })
}

/// Calls to the pull-request service
/// Labels: kind (pull_request/issue), result (success/rejected/unreachable)
pub fn publish_requests_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        counter_vec(
            "tournesol_publish_requests_total",
            "Total number of requests sent to the pull-request service",
            &["kind", "result"],
        )
    })
}

/// Encodes all registered metrics in Prometheus text format
///
/// # Returns
///
/// Returns a String containing all metrics in Prometheus exposition format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
