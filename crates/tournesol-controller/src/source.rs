/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Source Fetcher
//!
//! Retrieves the manifests of the application living in `apps/<namespace>/`
//! of the configured repository through the contents API:
//!
//! ```text
//! GET {api_url}/repos/{owner}/{repo}/contents/{path}?ref={branch}
//! ```
//!
//! A directory answers with a JSON array of `{type, name, path}` entries, a
//! file with a single object carrying base64 `content`. Directories are
//! walked with an explicit worklist; each file is fetched on its own.
//!
//! ## Failure handling
//!
//! - A missing namespace directory, or a traversal that yields no files, is
//!   [`ControllerError::NotFound`].
//! - A failing subdirectory is logged and skipped; the files gathered so far
//!   are still returned.
//! - A failing file is logged and skipped, except when the API reports quota
//!   exhaustion: the remaining calls would fail the same way, so the whole
//!   fetch ends with [`ControllerError::RateLimited`].
//! - Each request is retried under [`RetryPolicy::source_control`]. The
//!   `X-RateLimit-Reset` header shortens or lengthens the wait when it points
//!   less than five minutes ahead.

use crate::error::ControllerError;
use crate::models::SourceFiles;
use crate::retry::{self, RetryPolicy};
use base64::Engine;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tournesol_utils::config::Github;
use tournesol_utils::logging::prelude::*;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const CLIENT_USER_AGENT: &str = concat!("tournesol-controller/", env!("CARGO_PKG_VERSION"));
/// Longest reset-time wait honoured before falling back to the backoff schedule.
pub const MAX_RESET_WAIT: Duration = Duration::from_secs(300);

/// Body of a contents API response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentEntry>),
    File(FileContent),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    content: String,
    encoding: String,
    #[serde(default)]
    name: String,
}

/// Client for the source-control contents API.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(settings: &Github) -> Result<Self, ControllerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            token: settings.token().map(str::to_string),
            policy: RetryPolicy::source_control(settings.max_retries),
        })
    }

    /// Replaces the retry schedule, mostly so tests do not sleep for seconds.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Collects every file under `apps/<namespace>/`, keyed by its path
    /// relative to that directory.
    pub async fn fetch(&self, namespace: &str) -> Result<SourceFiles, ControllerError> {
        let root = format!("apps/{}", namespace);
        let prefix = format!("{}/", root);
        let mut files = SourceFiles::new();
        let mut pending = vec![root.clone()];

        info!("Fetching source files from {}/{}@{}:{}", self.owner, self.repo, self.branch, root);

        while let Some(dir) = pending.pop() {
            let listing = match self.get_contents(&dir).await {
                Ok(ContentsResponse::Listing(entries)) => entries,
                Ok(ContentsResponse::File(file)) if dir == root => {
                    // The namespace path is a single file rather than a directory.
                    let name = if file.name.is_empty() {
                        namespace.to_string()
                    } else {
                        file.name.clone()
                    };
                    files.insert(name, decode_content(&file)?);
                    break;
                }
                Ok(ContentsResponse::File(_)) => {
                    warn!("Expected a directory listing for {}, got a file; skipping", dir);
                    continue;
                }
                Err(e) if dir == root => {
                    match &e {
                        ControllerError::NotFound(_) => {
                            info!("No source directory {} in {}/{}", root, self.owner, self.repo)
                        }
                        other => error!("Failed to list {}: {}", root, other),
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping directory {} after error: {}", dir, e);
                    continue;
                }
            };

            for entry in listing {
                match entry.kind.as_str() {
                    "dir" => pending.push(entry.path),
                    "file" => match self.fetch_file(&entry.path).await {
                        Ok(content) => {
                            let relative = entry
                                .path
                                .strip_prefix(&prefix)
                                .unwrap_or(&entry.name)
                                .to_string();
                            debug!("Fetched {} ({} bytes)", entry.path, content.len());
                            files.insert(relative, content);
                        }
                        Err(e) if e.is_rate_limited() => {
                            error!("Rate limit exhausted while fetching {}: {}", entry.path, e);
                            return Err(e);
                        }
                        Err(e) => warn!("Skipping file {} after error: {}", entry.path, e),
                    },
                    other => debug!("Ignoring {} entry {}", other, entry.path),
                }
            }
        }

        if files.is_empty() {
            info!("No files found under {}", root);
            return Err(ControllerError::NotFound(format!("no files under {}", root)));
        }

        info!("Fetched {} source files for namespace {}", files.len(), namespace);
        Ok(files)
    }

    async fn fetch_file(&self, path: &str) -> Result<String, ControllerError> {
        match self.get_contents(path).await? {
            ContentsResponse::File(file) => decode_content(&file),
            ContentsResponse::Listing(_) => Err(ControllerError::MalformedResponse(format!(
                "expected file content for {}, got a directory listing",
                path
            ))),
        }
    }

    async fn get_contents(&self, path: &str) -> Result<ContentsResponse, ControllerError> {
        let label = format!("GET contents/{}", path);
        retry::retry(&self.policy, &label, || self.get_contents_once(path)).await
    }

    async fn get_contents_once(&self, path: &str) -> Result<ContentsResponse, ControllerError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, self.owner, self.repo, path
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }

        let response = request.send().await.map_err(|e| {
            warn!("Request to {} failed: {}", url, e);
            ControllerError::from(e)
        })?;

        let status = response.status();
        if let Some(err) = rate_limit_error(status, response.headers(), now_epoch()) {
            return Err(err);
        }

        match status {
            s if s.is_success() => response.json::<ContentsResponse>().await.map_err(|e| {
                ControllerError::MalformedResponse(format!("contents of {}: {}", path, e))
            }),
            StatusCode::NOT_FOUND => Err(ControllerError::NotFound(path.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ControllerError::Upstream {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Returns a rate-limit error when the response reports quota exhaustion:
/// status 429, or 403 with `X-RateLimit-Remaining: 0`.
fn rate_limit_error(status: StatusCode, headers: &HeaderMap, now: i64) -> Option<ControllerError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    let exhausted = header("x-ratelimit-remaining") == Some("0");
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && exhausted);
    if !limited {
        return None;
    }

    let from_reset = header("x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|reset| reset_wait(reset, now));
    let from_retry_after = || {
        header("retry-after")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .filter(|d| *d <= MAX_RESET_WAIT)
    };
    let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
        from_reset.or_else(from_retry_after)
    } else {
        from_reset
    };

    Some(ControllerError::RateLimited {
        message: format!("contents API returned {}", status.as_u16()),
        retry_after,
    })
}

/// Wait implied by a reset timestamp (epoch seconds), plus one second of
/// slack. `None` when the reset is in the past or five minutes or more away.
pub fn reset_wait(reset_epoch: i64, now_epoch: i64) -> Option<Duration> {
    let delta = reset_epoch - now_epoch;
    if delta > 0 && delta < MAX_RESET_WAIT.as_secs() as i64 {
        Some(Duration::from_secs(delta as u64 + 1))
    } else {
        None
    }
}

fn decode_content(file: &FileContent) -> Result<String, ControllerError> {
    if file.encoding != "base64" {
        return Err(ControllerError::MalformedResponse(format!(
            "unsupported content encoding {:?}",
            file.encoding
        )));
    }
    let compact: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ControllerError::MalformedResponse(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ControllerError::MalformedResponse(format!("content is not UTF-8: {}", e)))
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
