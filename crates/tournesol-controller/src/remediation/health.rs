/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Cached reachability verdict for the inference endpoint.
//!
//! The verdict is advisory: two pipelines finding it stale at the same time
//! may both probe, which is harmless.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a verdict is trusted before a new probe is required.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time copy of the cached verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub last_checked: Option<Instant>,
}

impl HealthSnapshot {
    /// Seconds since the last probe or observed call, if any.
    pub fn age(&self) -> Option<Duration> {
        self.last_checked.map(|at| at.elapsed())
    }
}

#[derive(Debug)]
pub struct EndpointHealth {
    state: Mutex<HealthSnapshot>,
    window: Duration,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self::with_window(FRESHNESS_WINDOW)
    }
}

impl EndpointHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            state: Mutex::new(HealthSnapshot {
                healthy: false,
                last_checked: None,
            }),
            window,
        }
    }

    /// Cached verdict when it is younger than the freshness window.
    pub fn fresh_verdict(&self) -> Option<bool> {
        let state = self.snapshot();
        match state.age() {
            Some(age) if age < self.window => Some(state.healthy),
            _ => None,
        }
    }

    pub fn record(&self, healthy: bool) {
        let mut state = self.lock();
        state.healthy = healthy;
        state.last_checked = Some(Instant::now());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
