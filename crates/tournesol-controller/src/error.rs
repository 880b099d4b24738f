/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Error taxonomy shared by the fetcher, the remediation engine and the publisher.

use std::time::Duration;

/// HTTP statuses worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors produced by calls to external services.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Expected absence, e.g. no source directory for a namespace
    NotFound(String),
    /// Upstream quota exhausted; `retry_after` carries a bounded wait hint
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// The service answered with a non-success status
    Upstream { status: u16, body: String },
    /// A deadline was exceeded
    Timeout(String),
    /// The response did not have the expected shape
    MalformedResponse(String),
    /// The service could not be reached
    Transport(String),
}

impl ControllerError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::RateLimited { .. }
            | ControllerError::Timeout(_)
            | ControllerError::Transport(_) => true,
            ControllerError::Upstream { status, .. } => RETRYABLE_STATUSES.contains(status),
            ControllerError::NotFound(_) | ControllerError::MalformedResponse(_) => false,
        }
    }

    /// Wait hint supplied by the upstream service, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ControllerError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ControllerError::RateLimited { .. })
    }
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::NotFound(what) => write!(f, "not found: {}", what),
            ControllerError::RateLimited { message, .. } => write!(f, "rate limited: {}", message),
            ControllerError::Upstream { status, body } => {
                write!(f, "upstream returned status {}: {}", status, body)
            }
            ControllerError::Timeout(what) => write!(f, "timed out: {}", what),
            ControllerError::MalformedResponse(e) => write!(f, "malformed response: {}", e),
            ControllerError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<reqwest::Error> for ControllerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ControllerError::Timeout(e.to_string())
        } else if e.is_decode() {
            ControllerError::MalformedResponse(e.to_string())
        } else {
            ControllerError::Transport(e.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for ControllerError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        ControllerError::Timeout(e.to_string())
    }
}
