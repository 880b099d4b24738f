/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Attempt-bounded exponential retry shared by every outbound call site.
//!
//! Call sites pass their own "is this retryable" predicate; a
//! [`ControllerError::retry_after`] hint replaces the computed wait for the
//! attempt that produced it.

use crate::error::ControllerError;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tournesol_utils::logging::prelude::*;

/// Retry configuration for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Content API calls: 1s, 2s, 4s, ...
    pub fn source_control(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }

    /// Chat completion calls, capped at 30s between attempts.
    pub fn inference(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_randomization_factor(0.0)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or `policy.max_attempts` attempts have been made. The last error
/// is returned when attempts run out.
pub async fn retry_with<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, ControllerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ControllerError>>,
    P: Fn(&ControllerError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let is_retryable = &is_retryable;
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let fut = operation();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if current < max_attempts && is_retryable(&err) => {
                        warn!(
                            "{} failed (attempt {}/{}): {}",
                            label, current, max_attempts, err
                        );
                        Err(backoff::Error::Transient {
                            retry_after: err.retry_after(),
                            err,
                        })
                    }
                    Err(err) => {
                        if current >= max_attempts && is_retryable(&err) {
                            error!(
                                "{} failed after {} attempts: {}",
                                label, max_attempts, err
                            );
                        } else {
                            debug!("{} failed with non-retryable error: {}", label, err);
                        }
                        Err(backoff::Error::Permanent(err))
                    }
                }
            }
        },
        |_err: ControllerError, wait: Duration| {
            info!("{} retrying in {:?}", label, wait);
        },
    )
    .await
}

/// [`retry_with`] using [`ControllerError::is_transient`] as the predicate.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Result<T, ControllerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ControllerError>>,
{
    retry_with(policy, label, ControllerError::is_transient, operation).await
}
