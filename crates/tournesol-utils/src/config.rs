/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tournesol Config Module
//! This module provides the configuration framework shared by the Tournesol crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `github`, `base_url`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "TOURNESOL__"
//!   (e.g., `TOURNESOL__GITHUB__TOKEN`)
//! - Configuration file keys use snake_case (e.g., `github.token`, `log.level`)
//!
//! # Configuration Overriding
//!
//! The configuration values are loaded and overridden in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! # Available Environment Variables
//!
//! - `TOURNESOL__LOG__LEVEL`: "trace", "debug", "info", "warn", "error" (default "info")
//! - `TOURNESOL__LOG__FORMAT`: "text" or "json" (default "text")
//! - `TOURNESOL__GITHUB__OWNER` / `__REPO` / `__BRANCH`: repository holding `apps/<namespace>/`
//! - `TOURNESOL__GITHUB__TOKEN`: optional access token; unauthenticated calls get stricter rate limits
//! - `TOURNESOL__INFERENCE__BASE_URL`: OpenAI-compatible base URL (`/chat/completions`, `/models`)
//! - `TOURNESOL__INFERENCE__MODEL`: model identifier sent with every chat request
//! - `TOURNESOL__INFERENCE__TIMEOUT_SECONDS`: per-attempt request deadline (default 60)
//! - `TOURNESOL__INFERENCE__MAX_RETRIES`: chat request attempts (default 3)
//! - `TOURNESOL__INFERENCE__HEALTH_CHECK`: gate requests on the cached `/models` probe (default true)
//! - `TOURNESOL__INFERENCE__USE_FALLBACK`: enable the local memory-limit heuristic (default true)
//! - `TOURNESOL__PUBLISHER__BASE_URL`: pull-request service base URL
//! - `TOURNESOL__PUBLISHER__ESCALATE_UNFIXED`: open an issue when no fix was produced (default false)
//! - `TOURNESOL__CONTROLLER__NAMESPACE`: namespace watched for diagnostic resources

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Source-control repository configuration
    pub github: Github,
    /// Inference endpoint configuration
    pub inference: Inference,
    /// Pull-request service configuration
    pub publisher: Publisher,
    /// Watch and pipeline configuration
    pub controller: Controller,
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Source-control content API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Github {
    /// API base URL
    pub api_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch the application manifests are read from
    pub branch: String,
    /// Access token
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Attempts per content request
    pub max_retries: u32,
}

impl Github {
    /// Returns the configured token, treating an empty string as absent.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Inference endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Inference {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum number of chat request attempts
    pub max_retries: u32,
    /// Whether requests are gated on the cached health probe
    pub health_check: bool,
    /// Whether the local heuristic runs when inference fails
    pub use_fallback: bool,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token budget
    pub max_tokens: u32,
}

/// Pull-request service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Publisher {
    /// Service base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Open an issue when a diagnostic yields no file updates
    #[serde(default)]
    pub escalate_unfixed: bool,
}

/// Watch loop and pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Controller {
    /// Namespace holding the diagnostic resources
    pub namespace: String,
    /// API group of the diagnostic resource
    pub group: String,
    /// API version of the diagnostic resource
    pub version: String,
    /// Kind of the diagnostic resource
    pub kind: String,
    /// Plural resource name
    pub plural: String,
    /// Kubeconfig path; in-cluster configuration when absent
    pub kubeconfig_path: Option<String>,
    /// Deadline for one diagnostic's full pipeline run, in seconds
    pub pipeline_timeout_seconds: u64,
    /// Health check HTTP server port
    pub health_port: Option<u16>,
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        // Add environment variables as a source, prefixed with "TOURNESOL" and using "__" as a separator
        s = s.add_source(
            Environment::with_prefix("TOURNESOL")
                .separator("__")
                .try_parsing(true),
        );

        s.build()?.try_deserialize()
    }
}
